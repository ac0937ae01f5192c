//! Fixed-point decimal values: `mantissa × 10^exponent`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A decimal number stored as a 64-bit mantissa and a signed power-of-ten exponent.
///
/// Equality, ordering and hashing are by numeric value, so `1.50` (`150e-2`) and
/// `1.5` (`15e-1`) are equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decimal {
    /// The unscaled value.
    pub mantissa: i64,
    /// The power of ten applied to the mantissa.
    pub exponent: i8,
}

fn pow10(digits: u32) -> Option<i128> {
    10i128.checked_pow(digits)
}

/// Scales `mantissa` up by `digits` powers of ten.
fn scale_up(mantissa: i128, digits: u32) -> Option<i128> {
    pow10(digits)?.checked_mul(mantissa)
}

impl Decimal {
    /// Zero, with the canonical exponent 0.
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        exponent: 0,
    };

    /// Smallest representable value.
    pub const MIN: Decimal = Decimal {
        mantissa: i64::MIN,
        exponent: i8::MAX,
    };

    /// Largest representable value.
    pub const MAX: Decimal = Decimal {
        mantissa: i64::MAX,
        exponent: i8::MAX,
    };

    /// Creates a decimal. A zero mantissa always gets exponent 0.
    pub fn new(mantissa: i64, exponent: i8) -> Self {
        if mantissa == 0 {
            Self::ZERO
        } else {
            Self { mantissa, exponent }
        }
    }

    /// Returns true for a zero mantissa.
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Returns the same value with trailing zeros stripped from the mantissa.
    pub fn normalized(&self) -> Self {
        if self.mantissa == 0 {
            return Self::ZERO;
        }
        let mut mantissa = self.mantissa;
        let mut exponent = self.exponent;
        while mantissa % 10 == 0 && exponent < i8::MAX {
            mantissa /= 10;
            exponent += 1;
        }
        Self { mantissa, exponent }
    }

    /// Approximates the value as a float.
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 * 10f64.powi(self.exponent as i32)
    }

    /// Returns `self + other`, dropping low digits if the exact sum does not fit.
    pub fn add(&self, other: &Decimal) -> Decimal {
        self.overflowing_add(other).0
    }

    /// Returns `self - other`, dropping low digits if the exact difference does not
    /// fit.
    pub fn subtract(&self, other: &Decimal) -> Decimal {
        self.overflowing_subtract(other).0
    }

    /// Returns `self + other`, or `None` if the sum cannot be represented exactly.
    pub fn checked_add(&self, other: &Decimal) -> Option<Decimal> {
        match self.overflowing_add(other) {
            (sum, false) => Some(sum),
            (_, true) => None,
        }
    }

    /// Returns `self - other`, or `None` if the difference cannot be represented
    /// exactly.
    pub fn checked_subtract(&self, other: &Decimal) -> Option<Decimal> {
        match self.overflowing_subtract(other) {
            (difference, false) => Some(difference),
            (_, true) => None,
        }
    }

    /// Returns `self + other` and whether non-zero digits were dropped to fit it.
    pub fn overflowing_add(&self, other: &Decimal) -> (Decimal, bool) {
        Self::combine(self, other.mantissa as i128, other.exponent)
    }

    /// Returns `self - other` and whether non-zero digits were dropped to fit it.
    pub fn overflowing_subtract(&self, other: &Decimal) -> (Decimal, bool) {
        Self::combine(self, -(other.mantissa as i128), other.exponent)
    }

    /// Adds `mantissa × 10^exponent` to `lhs`.
    ///
    /// Operands are aligned on the smaller exponent. If the aligned sum no longer
    /// fits in 64 bits, precision is dropped one digit at a time until it does.
    fn combine(lhs: &Decimal, mantissa: i128, exponent: i8) -> (Decimal, bool) {
        let lhs_mantissa = lhs.mantissa as i128;
        if mantissa == 0 {
            return (Self::new(lhs.mantissa, lhs.exponent), false);
        }
        if lhs_mantissa == 0 {
            return Self::fit(mantissa, exponent as i32, false);
        }

        let target = lhs.exponent.min(exponent) as i32;
        let aligned = scale_up(lhs_mantissa, (lhs.exponent as i32 - target) as u32)
            .zip(scale_up(mantissa, (exponent as i32 - target) as u32));

        match aligned {
            Some((a, b)) => Self::fit(a + b, target, false),
            None => {
                // The exponent gap is too wide to align without overflow, so align on
                // the larger exponent instead and let the small operand lose digits.
                let target = lhs.exponent.max(exponent) as i32;
                let mut lost = false;
                let mut shrink = |m: i128, e: i8| -> i128 {
                    match pow10((target - e as i32) as u32) {
                        Some(divisor) => {
                            lost |= m % divisor != 0;
                            m / divisor
                        }
                        None => {
                            lost = true;
                            0
                        }
                    }
                };
                let sum = shrink(lhs_mantissa, lhs.exponent) + shrink(mantissa, exponent);
                Self::fit(sum, target, lost)
            }
        }
    }

    /// Narrows a wide intermediate result back into an `i64` mantissa.
    fn fit(mut mantissa: i128, mut exponent: i32, mut lost: bool) -> (Decimal, bool) {
        while mantissa > i64::MAX as i128 || mantissa < i64::MIN as i128 {
            lost |= mantissa % 10 != 0;
            mantissa /= 10;
            exponent += 1;
        }
        if exponent > i8::MAX as i32 {
            // Saturate instead of wrapping the exponent.
            let saturated = if mantissa < 0 { Self::MIN } else { Self::MAX };
            return (saturated, true);
        }
        while exponent < i8::MIN as i32 {
            lost |= mantissa % 10 != 0;
            mantissa /= 10;
            exponent += 1;
        }
        (Self::new(mantissa as i64, exponent as i8), lost)
    }

    fn cmp_value(&self, other: &Decimal) -> Ordering {
        let lhs_sign = self.mantissa.signum();
        let rhs_sign = other.mantissa.signum();
        if lhs_sign != rhs_sign {
            return lhs_sign.cmp(&rhs_sign);
        }
        if lhs_sign == 0 {
            return Ordering::Equal;
        }
        let target = self.exponent.min(other.exponent) as i32;
        let lhs = scale_up(self.mantissa as i128, (self.exponent as i32 - target) as u32);
        let rhs = scale_up(other.mantissa as i128, (other.exponent as i32 - target) as u32);
        match (lhs, rhs) {
            (Some(a), Some(b)) => a.cmp(&b),
            // Only the operand with the larger exponent can overflow, and it then has
            // the larger magnitude.
            (None, _) => {
                if lhs_sign > 0 {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (_, None) => {
                if lhs_sign > 0 {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
        }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_value(other) == Ordering::Equal
    }
}

impl Eq for Decimal {}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }
}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let normalized = self.normalized();
        normalized.mantissa.hash(state);
        normalized.exponent.hash(state);
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent >= 0 {
            write!(f, "{}", self.mantissa)?;
            for _ in 0..self.exponent {
                write!(f, "0")?;
            }
            return Ok(());
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = (-(self.exponent as i32)) as usize;
        let sign = if self.mantissa < 0 { "-" } else { "" };
        if digits.len() > scale {
            let (int_part, frac_part) = digits.split_at(digits.len() - scale);
            write!(f, "{}{}.{}", sign, int_part, frac_part)
        } else {
            write!(f, "{}0.{}{}", sign, "0".repeat(scale - digits.len()), digits)
        }
    }
}
