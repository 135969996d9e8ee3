//! Integer helpers for the scaled fixed-point calibration arithmetic.
//!
//! All divisions round the way the calibration constants were characterized:
//! plain `/` truncates toward zero, [div_round_closest] rounds half away from zero.

/// Divide and round to the closest integer, ties away from zero.
///
/// `d` must not be zero.
pub const fn div_round_closest(x: i64, d: i64) -> i64 {
    if (x > 0) == (d > 0) {
        (x + d / 2) / d
    } else {
        (x - d / 2) / d
    }
}

/// Integer square root, rounded down.
pub const fn int_sqrt(x: u64) -> u64 {
    if x <= 1 {
        return x;
    }
    let mut x = x;
    let mut y = 0;
    let mut m = 1u64 << ((63 - x.leading_zeros()) & !1);
    while m != 0 {
        let b = y + m;
        y >>= 1;
        if x >= b {
            x -= b;
            y += m;
        }
        m >>= 2;
    }
    y
}

/// Power of ten scaling `|num|` down to a single digit of at most one,
/// e.g. 5 -> 10, 987 -> 1000, 1000 -> 1000, 1999 -> 1000, 2000 -> 10000.
///
/// Returns 0 for 0 and 1 for +-1.
pub const fn ceil_pow10(num: i64) -> i64 {
    let mut tmp = num.unsigned_abs();
    if tmp == 0 {
        return 0;
    }
    let mut val = 1;
    while tmp > 1 {
        val *= 10;
        tmp /= 10;
    }
    val
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_closest() {
        for (x, d, q) in [
            (65_000_000, 10_000, 6500),
            (15, 10, 2),
            (14, 10, 1),
            (-15, 10, -2),
            (-14, 10, -1),
            (0, 10, 0),
            (-2775, 10, -278),
            (1_338_811, 100, 13388),
            (7, -2, -4),
        ] {
            assert_eq!(div_round_closest(x, d), q, "{x} / {d}");
        }
    }

    #[test]
    fn sqrt() {
        for x in 0..2000u64 {
            let r = int_sqrt(x);
            assert!(r * r <= x && (r + 1) * (r + 1) > x, "sqrt({x}) = {r}");
        }
        assert_eq!(int_sqrt(1_323_502), 1150);
        assert_eq!(int_sqrt(1_000_000), 1000);
        assert_eq!(int_sqrt(u64::MAX), u32::MAX as u64);
    }

    #[test]
    fn pow10() {
        assert_eq!(ceil_pow10(0), 0);
        assert_eq!(ceil_pow10(1), 1);
        assert_eq!(ceil_pow10(-1), 1);
        assert_eq!(ceil_pow10(5), 10);
        assert_eq!(ceil_pow10(987), 1000);
        assert_eq!(ceil_pow10(1000), 1000);
        assert_eq!(ceil_pow10(1999), 1000);
        assert_eq!(ceil_pow10(2000), 10000);
        assert_eq!(ceil_pow10(-1_323_502), 1_000_000);
    }
}
