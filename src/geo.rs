use crate::fix::GpsFix;

/// Mean Earth radius, in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two [GpsFix]es, in kilometers,
/// using the haversine formula on a spherical Earth.
///
/// Any finite input is accepted: range checking is performed upstream,
/// when the [GpsFix] is validated.
pub fn distance(a: &GpsFix, b: &GpsFix) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);

    // rounding may push h slightly out of [0, 1]
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
