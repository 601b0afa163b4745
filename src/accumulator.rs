use crate::{fix::GpsFix, geo::distance};

/// Running distance state of one stream.
/// Fixes are folded in arrival order: the total is the sum of consecutive
/// pairwise distances.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    /// Latest folded [GpsFix], anchor of the next segment
    last_valid_fix: Option<GpsFix>,

    /// Total distance, in kilometers
    total_distance: f64,

    /// Number of folded [GpsFix]es
    valid_count: u64,
}

impl Accumulator {
    /// Folds a new validated [GpsFix] and returns the length of the new
    /// segment, in kilometers (0 for the very first fix).
    pub fn fold(&mut self, fix: GpsFix) -> f64 {
        let segment = match &self.last_valid_fix {
            Some(anchor) => distance(anchor, &fix),
            None => 0.0,
        };

        self.total_distance += segment;
        self.last_valid_fix = Some(fix);
        self.valid_count += 1;
        segment
    }

    /// Total distance, in kilometers
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    pub fn valid_count(&self) -> u64 {
        self.valid_count
    }

    pub fn last_valid_fix(&self) -> Option<&GpsFix> {
        self.last_valid_fix.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::Accumulator;
    use crate::{fix::GpsFix, geo::distance};

    #[test]
    fn first_fix_is_anchor() {
        let mut acc = Accumulator::default();
        assert!(acc.last_valid_fix().is_none());

        let fix = GpsFix::new(10.0, 20.0);
        assert_eq!(acc.fold(fix), 0.0);

        assert_eq!(acc.total_distance(), 0.0);
        assert_eq!(acc.valid_count(), 1);
        assert_eq!(acc.last_valid_fix(), Some(&fix));
    }

    #[test]
    fn sum_of_consecutive_segments() {
        let fixes = [
            GpsFix::new(0.0, 0.0),
            GpsFix::new(0.0, 1.0),
            GpsFix::new(1.0, 1.0),
            GpsFix::new(1.0, 1.0),
            GpsFix::new(-3.0, 4.5),
        ];

        let mut acc = Accumulator::default();
        let mut previous_total = 0.0;

        for fix in fixes {
            acc.fold(fix);
            assert!(acc.total_distance() >= previous_total);
            previous_total = acc.total_distance();
        }

        let expected: f64 = fixes.windows(2).map(|w| distance(&w[0], &w[1])).sum();

        assert_eq!(acc.valid_count(), fixes.len() as u64);
        assert!((acc.total_distance() - expected).abs() < 1e-9);
    }

    #[test]
    fn order_dependent() {
        let a = GpsFix::new(0.0, 0.0);
        let b = GpsFix::new(0.0, 10.0);
        let c = GpsFix::new(0.0, 5.0);

        let mut forward = Accumulator::default();
        for fix in [a, b, c] {
            forward.fold(fix);
        }

        let mut swapped = Accumulator::default();
        for fix in [a, c, b] {
            swapped.fold(fix);
        }

        assert_eq!(forward.valid_count(), swapped.valid_count());
        assert!((forward.total_distance() - swapped.total_distance()).abs() > 1.0);
    }

    #[test]
    fn repeated_fix_adds_nothing() {
        let mut acc = Accumulator::default();
        let fix = GpsFix::new(45.0, 5.0);
        acc.fold(fix);
        assert_eq!(acc.fold(fix), 0.0);
        assert_eq!(acc.total_distance(), 0.0);
        assert_eq!(acc.valid_count(), 2);
    }
}
