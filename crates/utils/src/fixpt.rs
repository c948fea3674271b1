//! Signed 31.32 fixed-point numbers.
//!
//! Scaling ratios and bandwidth figures are computed without floating point
//! so the same math runs in no_std builds.

use core::fmt;
use core::ops::{Add, Div, Mul, Sub};

const FRAC_BITS: u32 = 32;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed31_32(i64);

impl Fixed31_32 {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1 << FRAC_BITS);

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn from_int(v: i64) -> Self {
        Self(v << FRAC_BITS)
    }

    /// `num / den`. A zero denominator yields zero.
    pub const fn from_fraction(num: i64, den: i64) -> Self {
        if den == 0 {
            return Self::ZERO;
        }
        Self((((num as i128) << FRAC_BITS) / den as i128) as i64)
    }

    pub const fn floor(self) -> i64 {
        self.0 >> FRAC_BITS
    }

    pub const fn ceil(self) -> i64 {
        let mask = (1i64 << FRAC_BITS) - 1;
        if self.0 & mask == 0 {
            self.0 >> FRAC_BITS
        } else {
            (self.0 >> FRAC_BITS) + 1
        }
    }

    pub const fn round(self) -> i64 {
        (self.0 + (1i64 << (FRAC_BITS - 1))) >> FRAC_BITS
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Multiply by an integer, saturating instead of wrapping.
    pub const fn mul_int(self, v: i64) -> Self {
        Self(self.0.saturating_mul(v))
    }

    /// Fractional part in units of 1/2^19, the precision scaler ratio registers take.
    pub const fn to_u3d19(self) -> u32 {
        ((self.0 >> (FRAC_BITS - 19)) & 0x3F_FFFF) as u32
    }
}

impl Add for Fixed31_32 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Fixed31_32 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul for Fixed31_32 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let wide = (self.0 as i128 * rhs.0 as i128) >> FRAC_BITS;
        Self(wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl Div for Fixed31_32 {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        if rhs.0 == 0 {
            return Self::ZERO;
        }
        let wide = ((self.0 as i128) << FRAC_BITS) / rhs.0 as i128;
        Self(wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }
}

impl fmt::Debug for Fixed31_32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Fixed31_32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Four decimal places is plenty for ratios in logs.
        let scaled = (self.0 as i128 * 10_000) >> FRAC_BITS;
        let sign = if scaled < 0 { "-" } else { "" };
        let abs = scaled.unsigned_abs();
        write!(f, "{}{}.{:04}", sign, abs / 10_000, abs % 10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction_and_rounding() {
        let r = Fixed31_32::from_fraction(3840, 1920);
        assert_eq!(r, Fixed31_32::from_int(2));

        let third = Fixed31_32::from_fraction(1, 3);
        assert_eq!(third.floor(), 0);
        assert_eq!(third.ceil(), 1);
        assert_eq!(third.round(), 0);
        assert_eq!(Fixed31_32::from_fraction(3, 2).round(), 2);
    }

    #[test]
    fn test_arithmetic() {
        let a = Fixed31_32::from_fraction(3, 2);
        let b = Fixed31_32::from_int(4);
        assert_eq!((a * b).floor(), 6);
        assert_eq!((b / a).floor(), 2);
        assert_eq!((a + a).floor(), 3);
        assert_eq!(Fixed31_32::ONE / Fixed31_32::ZERO, Fixed31_32::ZERO);
        assert_eq!(Fixed31_32::from_fraction(1, 0), Fixed31_32::ZERO);
    }

    #[test]
    fn test_display() {
        extern crate std;
        use std::format;
        assert_eq!(format!("{}", Fixed31_32::from_fraction(1, 4)), "0.2500");
        assert_eq!(format!("{}", Fixed31_32::from_int(-2)), "-2.0000");
    }
}
