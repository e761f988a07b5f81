//! # Placement Mathematics
//!
//! Angle and rounding helpers used when docking archetypes onto doors.

/// Rounds a coordinate to one decimal place, ties to even.
///
/// Corner positions drift slightly after repeated rotations; rounding before
/// containment tests keeps a corner that sits on the play-area border from
/// flickering in and out.
///
/// # Examples
///
/// ```
/// use room_allocation::round_to_tenth;
///
/// assert_eq!(round_to_tenth(1.04), 1.0);
/// assert_eq!(round_to_tenth(-0.26), -0.3);
/// ```
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Wraps an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Returns the heading facing exactly away from `degrees`.
///
/// # Examples
///
/// ```
/// use room_allocation::opposite_angle;
///
/// assert_eq!(opposite_angle(180.0), 0.0);
/// assert_eq!(opposite_angle(90.0), 270.0);
/// ```
pub fn opposite_angle(degrees: f64) -> f64 {
    normalize_degrees(degrees + 180.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_tenth() {
        assert_eq!(round_to_tenth(2.0), 2.0);
        assert_eq!(round_to_tenth(1.96), 2.0);
        assert_eq!(round_to_tenth(0.04), 0.0);
        assert_eq!(round_to_tenth(-1.04), -1.0);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(450.0), 90.0);
    }

    #[test]
    fn test_opposite_angle() {
        assert_eq!(opposite_angle(0.0), 180.0);
        assert_eq!(opposite_angle(270.0), 90.0);
        assert_eq!(opposite_angle(-90.0), 90.0);
    }
}
