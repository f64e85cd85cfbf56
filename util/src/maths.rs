//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value into the range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Wrap an angle in degrees into the range `(-180, 180]`.
pub fn wrap_deg_180<T>(value: T) -> T
where
    T: Float
{
    let full = T::from(360.0).unwrap_or_else(T::zero);
    let half = T::from(180.0).unwrap_or_else(T::zero);

    let w = rem_euclid(value + half, full) - half;

    // rem_euclid gives [-180, 180), flip the lower bound to match the range above
    if w <= -half {
        w + full
    }
    else {
        w
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrap_deg_180() {
        assert_eq!(wrap_deg_180(0f64), 0f64);
        assert_eq!(wrap_deg_180(90f64), 90f64);
        assert_eq!(wrap_deg_180(180f64), 180f64);
        assert_eq!(wrap_deg_180(-180f64), 180f64);
        assert_eq!(wrap_deg_180(270f64), -90f64);
        assert_eq!(wrap_deg_180(-450f64), -90f64);
        assert_eq!(wrap_deg_180(720f64), 0f64);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&95f64, &-90f64, &90f64), 90f64);
        assert_eq!(clamp(&-95f64, &-90f64, &90f64), -90f64);
        assert_eq!(clamp(&12.5f64, &-90f64, &90f64), 12.5f64);
    }

    #[test]
    fn test_rem_euclid() {
        assert_eq!(rem_euclid(-1f64, 360f64), 359f64);
        assert_eq!(rem_euclid(361f64, 360f64), 1f64);
    }
}
