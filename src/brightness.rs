// SPDX-License-Identifier: GPL-3.0-only
//! Brightness calculation logic
//!
//! Maps the shared abstract level onto the raw value range of one display.
//! Each display has its own response curve `raw(p) = min + (max - min) * p^gamma`
//! and a reference range `ref_min..=ref_max` marking the raw values that
//! correspond to the brightest and dimmest shared state. The level is
//! interpolated in perceptual space between the two reference points and
//! then converted back to raw.

use crate::error::CalibrationError;

/// Validated calibration of one display
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    min: u32,
    max: u32,
    ref_min: u32,
    ref_max: u32,
    gamma: f64,
    // perceptual positions of ref_min / ref_max on this display's curve
    p_lo: f64,
    p_hi: f64,
}

impl Calibration {
    /// Create a calibration, checking `min <= ref_min < ref_max <= max` and
    /// `gamma > 0`
    ///
    /// # Arguments
    ///
    /// * `min`, `max` - Raw range accepted by the display
    /// * `ref_min`, `ref_max` - Raw values of the dimmest and brightest shared level
    /// * `gamma` - Exponent of the display's response curve (1.0 is linear)
    pub fn new(
        min: u32,
        max: u32,
        ref_min: u32,
        ref_max: u32,
        gamma: f64,
    ) -> Result<Self, CalibrationError> {
        if max <= min {
            return Err(CalibrationError::EmptyRange { min, max });
        }
        if ref_min < min {
            return Err(CalibrationError::RefMinBelowMin { ref_min, min });
        }
        if ref_max > max {
            return Err(CalibrationError::RefMaxAboveMax { ref_max, max });
        }
        if ref_min >= ref_max {
            return Err(CalibrationError::EmptyReferenceRange { ref_min, ref_max });
        }
        if !gamma.is_finite() || gamma <= 0.0 {
            return Err(CalibrationError::Gamma(gamma));
        }

        let span = (max - min) as f64;
        let p_lo = ((ref_min - min) as f64 / span).powf(1.0 / gamma);
        let p_hi = ((ref_max - min) as f64 / span).powf(1.0 / gamma);

        Ok(Self {
            min,
            max,
            ref_min,
            ref_max,
            gamma,
            p_lo,
            p_hi,
        })
    }

    /// Calibration covering the whole raw range with a linear curve
    pub fn linear(min: u32, max: u32) -> Result<Self, CalibrationError> {
        Self::new(min, max, min, max, 1.0)
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn ref_min(&self) -> u32 {
        self.ref_min
    }

    pub fn ref_max(&self) -> u32 {
        self.ref_max
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Raw value for `level` on a scale where 0 is brightest and `level_max`
    /// is dimmest
    ///
    /// Levels beyond `level_max` are treated as `level_max`. The two ends of
    /// the scale return `ref_max` and `ref_min` exactly.
    pub fn raw_value(&self, level: u8, level_max: u8) -> u32 {
        let level = level.min(level_max);
        if level == 0 {
            return self.ref_max;
        }
        if level == level_max {
            return self.ref_min;
        }

        if self.gamma == 1.0 {
            return self.linear_value(level, level_max);
        }

        let g = f64::from(level_max - level) / f64::from(level_max);
        let p = self.p_lo + g * (self.p_hi - self.p_lo);
        let span = (self.max - self.min) as f64;
        let raw = (self.min as f64 + span * p.powf(self.gamma)).round();

        // float error must not push an interior level past the reference ends
        (raw as u32).clamp(self.ref_min, self.ref_max)
    }

    /// Plain interpolation between the reference ends, rounded half up in
    /// integer arithmetic so that .5 cases are never lost to float error
    fn linear_value(&self, level: u8, level_max: u8) -> u32 {
        let span = u64::from(self.ref_max - self.ref_min);
        let steps = u64::from(level_max);
        let numerator = span * u64::from(level_max - level);
        let offset = (2 * numerator + steps) / (2 * steps);
        // offset <= span, which came from a u32
        self.ref_min + offset as u32
    }

    /// Width of the reference range in raw units; it holds one more distinct
    /// raw value than this
    pub fn reference_span(&self) -> u32 {
        self.ref_max - self.ref_min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEPS: u8 = 9;

    fn panel() -> Calibration {
        Calibration::new(750, 120_000, 750, 90_000, 2.2).unwrap()
    }

    fn monitor() -> Calibration {
        Calibration::linear(0, 100).unwrap()
    }

    #[test]
    fn test_reference_endpoints() {
        assert_eq!(panel().raw_value(0, STEPS), 90_000);
        assert_eq!(panel().raw_value(STEPS, STEPS), 750);
        assert_eq!(monitor().raw_value(0, STEPS), 100);
        assert_eq!(monitor().raw_value(STEPS, STEPS), 0);
    }

    #[test]
    fn test_intermediate_levels_strictly_decrease() {
        for cal in [panel(), monitor()] {
            let values: Vec<u32> = (0..=STEPS).map(|l| cal.raw_value(l, STEPS)).collect();
            for pair in values.windows(2) {
                assert!(pair[0] > pair[1], "{:?} not strictly decreasing", values);
            }
        }
    }

    #[test]
    fn test_linear_matches_interpolation() {
        let cal = monitor();
        let expected = [100, 89, 78, 67, 56, 44, 33, 22, 11, 0];
        for (level, want) in expected.iter().enumerate() {
            assert_eq!(cal.raw_value(level as u8, STEPS), *want);
        }
    }

    #[test]
    fn test_linear_half_steps_round_up() {
        // 45 * 7 / 10 = 31.5
        assert_eq!(Calibration::linear(0, 45).unwrap().raw_value(3, 10), 32);
        // 85 * 7 / 10 = 59.5
        assert_eq!(Calibration::linear(0, 85).unwrap().raw_value(3, 10), 60);
        // offset from ref_min, not from min
        let cal = Calibration::new(0, 200, 10, 55, 1.0).unwrap();
        assert_eq!(cal.raw_value(3, 10), 42);
    }

    #[test]
    fn test_gamma_curve_is_perceptual() {
        // halfway in perceptual space is well below halfway in raw space
        let cal = Calibration::new(0, 1000, 0, 1000, 2.0).unwrap();
        let mid = cal.raw_value(1, 2);
        assert_eq!(mid, 250);
    }

    #[test]
    fn test_level_past_max_is_clamped() {
        assert_eq!(panel().raw_value(200, STEPS), 750);
    }

    #[test]
    fn test_invalid_calibrations() {
        assert_eq!(
            Calibration::new(100, 100, 100, 100, 1.0),
            Err(CalibrationError::EmptyRange { min: 100, max: 100 })
        );
        assert_eq!(
            Calibration::new(10, 100, 5, 100, 1.0),
            Err(CalibrationError::RefMinBelowMin { ref_min: 5, min: 10 })
        );
        assert_eq!(
            Calibration::new(0, 100, 0, 101, 1.0),
            Err(CalibrationError::RefMaxAboveMax { ref_max: 101, max: 100 })
        );
        assert_eq!(
            Calibration::new(0, 100, 60, 60, 1.0),
            Err(CalibrationError::EmptyReferenceRange { ref_min: 60, ref_max: 60 })
        );
        assert!(matches!(
            Calibration::new(0, 100, 0, 100, 0.0),
            Err(CalibrationError::Gamma(_))
        ));
        assert!(matches!(
            Calibration::new(0, 100, 0, 100, f64::NAN),
            Err(CalibrationError::Gamma(_))
        ));
    }
}
