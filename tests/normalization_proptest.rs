// SPDX-License-Identifier: GPL-3.0-only
//! Property-based tests for the level to raw brightness mapping.
//! Checks the mapping for arbitrary calibrations, not just fixed panels.

use backlightd::brightness::Calibration;
use proptest::prelude::*;

/// Valid calibration parameters: `min <= ref_min < ref_max <= max`
fn calibration() -> impl Strategy<Value = Calibration> {
    (0u32..1_000, 1u32..200_000, 0.2f64..4.0)
        .prop_flat_map(|(min, span, gamma)| {
            let max = min + span;
            (Just(min), Just(max), min..max, Just(gamma))
        })
        .prop_flat_map(|(min, max, ref_min, gamma)| {
            (Just(min), Just(max), Just(ref_min), (ref_min + 1)..=max, Just(gamma))
        })
        .prop_map(|(min, max, ref_min, ref_max, gamma)| {
            Calibration::new(min, max, ref_min, ref_max, gamma).unwrap()
        })
}

proptest! {
    /// Level 0 and the last level hit the reference ends exactly.
    #[test]
    fn endpoints_are_exact(cal in calibration(), level_max in 1u8..=50) {
        prop_assert_eq!(cal.raw_value(0, level_max), cal.ref_max());
        prop_assert_eq!(cal.raw_value(level_max, level_max), cal.ref_min());
    }

    /// A dimmer level never gives a brighter raw value.
    #[test]
    fn dimmer_levels_never_brighten(cal in calibration(), level_max in 1u8..=50) {
        let raws: Vec<u32> = (0..=level_max).map(|l| cal.raw_value(l, level_max)).collect();
        for pair in raws.windows(2) {
            prop_assert!(pair[0] >= pair[1], "not monotonic: {:?}", raws);
        }
    }

    /// Every raw value stays inside the reference range, even past the last level.
    #[test]
    fn raw_stays_in_reference_range(cal in calibration(), level in 0u8..=255, level_max in 1u8..=50) {
        let raw = cal.raw_value(level, level_max);
        prop_assert!(raw >= cal.ref_min() && raw <= cal.ref_max());
        if level >= level_max {
            prop_assert_eq!(raw, cal.ref_min());
        }
    }

    /// With gamma 1 the mapping is `round(max - level * (max - min) / level_max)`,
    /// halves rounded up.
    #[test]
    fn gamma_one_is_linear(min in 0u32..1_000, span in 1u32..200_000, level_max in 1u8..=50, level in 0u8..=50) {
        let level = level.min(level_max);
        let max = min + span;
        let cal = Calibration::linear(min, max).unwrap();

        let steps = u64::from(level_max);
        let numerator = u64::from(max) * steps - u64::from(level) * u64::from(span);
        let expected = (2 * numerator + steps) / (2 * steps);
        prop_assert_eq!(u64::from(cal.raw_value(level, level_max)), expected, "level {}/{}", level, level_max);
    }
}
