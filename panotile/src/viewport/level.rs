//! Level-of-detail selection from the field of view.

/// Widest field of view the generic formula distinguishes.
const GENERIC_MAX_FOV: f64 = 100.0;

/// Narrowest field of view the generic formula distinguishes.
const GENERIC_MIN_FOV: f64 = 5.0;

/// Breakpoints `(max_fov, level)` for the common pyramid depths.
///
/// Checked in order; the first `fov <= max_fov` wins, otherwise level 0.
const TABLE_2: &[(f64, u32)] = &[(90.0, 1)];
const TABLE_3: &[(f64, u32)] = &[(50.0, 2), (75.0, 1)];
const TABLE_4: &[(f64, u32)] = &[(20.0, 3), (35.0, 2), (55.0, 1)];
const TABLE_5: &[(f64, u32)] = &[(15.0, 4), (25.0, 3), (40.0, 2), (60.0, 1)];

/// Picks the level position for a field of view in degrees.
///
/// Narrower fields of view select higher-resolution levels. The result is
/// a position in resolution order (0 = coarsest), always below
/// `level_count` unless `level_count` is 0. A non-finite `fov` selects the
/// coarsest level.
pub fn select_level(fov: f64, level_count: usize) -> usize {
    if level_count == 0 || !fov.is_finite() {
        return 0;
    }

    let table = match level_count {
        2 => TABLE_2,
        3 => TABLE_3,
        4 => TABLE_4,
        5 => TABLE_5,
        n => return generic_level(fov, n),
    };

    table
        .iter()
        .find(|(max_fov, _)| fov <= *max_fov)
        .map_or(0, |(_, level)| *level as usize)
}

fn generic_level(fov: f64, level_count: usize) -> usize {
    let step = (GENERIC_MAX_FOV - GENERIC_MIN_FOV) / level_count as f64;
    let index = ((GENERIC_MAX_FOV - fov) / step).floor();
    index.clamp(0.0, (level_count - 1) as f64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_levels() {
        assert_eq!(select_level(30.0, 3), 2);
        assert_eq!(select_level(50.0, 3), 2);
        assert_eq!(select_level(50.1, 3), 1);
        assert_eq!(select_level(75.0, 3), 1);
        assert_eq!(select_level(75.1, 3), 0);
        assert_eq!(select_level(120.0, 3), 0);
    }

    #[test]
    fn test_two_levels() {
        assert_eq!(select_level(90.0, 2), 1);
        assert_eq!(select_level(90.5, 2), 0);
    }

    #[test]
    fn test_four_levels() {
        assert_eq!(select_level(20.0, 4), 3);
        assert_eq!(select_level(35.0, 4), 2);
        assert_eq!(select_level(55.0, 4), 1);
        assert_eq!(select_level(56.0, 4), 0);
    }

    #[test]
    fn test_five_levels() {
        assert_eq!(select_level(10.0, 5), 4);
        assert_eq!(select_level(25.0, 5), 3);
        assert_eq!(select_level(40.0, 5), 2);
        assert_eq!(select_level(60.0, 5), 1);
        assert_eq!(select_level(61.0, 5), 0);
    }

    #[test]
    fn test_generic_formula() {
        // step = 95 / 6 ≈ 15.83
        assert_eq!(select_level(100.0, 6), 0);
        assert_eq!(select_level(80.0, 6), 1);
        assert_eq!(select_level(5.0, 6), 5);
        assert_eq!(select_level(1.0, 6), 5);
        assert_eq!(select_level(150.0, 6), 0);
        assert_eq!(select_level(30.0, 1), 0);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(select_level(30.0, 0), 0);
        assert_eq!(select_level(f64::NAN, 3), 0);
        assert_eq!(select_level(f64::INFINITY, 5), 0);
    }

    #[test]
    fn test_monotonic_in_fov() {
        for count in 1..10 {
            let mut previous = usize::MAX;
            for step in 0..=180 {
                let level = select_level(step as f64, count);
                assert!(level <= previous, "count {count} fov {step}");
                assert!(level < count);
                previous = level;
            }
        }
    }
}
