use serde_json::{Map, Value};
use thiserror::Error;

/// Generic decoded record, as received from the stream
pub type Record = Map<String, Value>;

/// Accepted latitude keys, by order of preference
const LATITUDE_KEYS: [&str; 2] = ["latitude", "lat"];

/// Accepted longitude keys, by order of preference
const LONGITUDE_KEYS: [&str; 4] = ["longitude", "lon", "lng", "long"];

/// Coordinates may be nested in a "gps" object
const GPS_OBJECT_KEY: &str = "gps";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Latitude,
    Longitude,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latitude => write!(f, "latitude"),
            Self::Longitude => write!(f, "longitude"),
        }
    }
}

impl Field {
    fn keys(&self) -> &'static [&'static str] {
        match self {
            Self::Latitude => &LATITUDE_KEYS,
            Self::Longitude => &LONGITUDE_KEYS,
        }
    }

    /// Valid range, in decimal degrees
    fn range(&self) -> std::ops::RangeInclusive<f64> {
        match self {
            Self::Latitude => -90.0..=90.0,
            Self::Longitude => -180.0..=180.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing {0}")]
    MissingField(Field),
    #[error("{0} is not a number")]
    NotNumeric(Field),
    #[error("{field} {value} out of range")]
    OutOfRange { field: Field, value: f64 },
}

/// Validated GPS position, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

impl std::fmt::Display for GpsFix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.7}, {:.7})", self.latitude, self.longitude)
    }
}

impl GpsFix {
    pub(crate) fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Validates a raw [Record] and converts it to a [GpsFix].
/// This is the only way to obtain a [GpsFix] from stream content.
pub fn validate(raw: &Record) -> Result<GpsFix, ValidationError> {
    let fields = match raw.get(GPS_OBJECT_KEY) {
        Some(Value::Object(nested)) => nested,
        _ => raw,
    };

    let latitude = coordinate(fields, Field::Latitude)?;
    let longitude = coordinate(fields, Field::Longitude)?;

    Ok(GpsFix {
        latitude,
        longitude,
    })
}

fn coordinate(fields: &Record, field: Field) -> Result<f64, ValidationError> {
    let value = field
        .keys()
        .iter()
        .find_map(|key| fields.get(*key))
        .ok_or(ValidationError::MissingField(field))?;

    let value = match value {
        Value::Number(number) => number.as_f64(),
        // numeric strings are tolerated
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|value| value.is_finite())
    .ok_or(ValidationError::NotNumeric(field))?;

    if !field.range().contains(&value) {
        return Err(ValidationError::OutOfRange { field, value });
    }

    Ok(value)
}
