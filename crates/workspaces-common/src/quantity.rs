//! Exact Kubernetes quantity arithmetic
//!
//! Quantities such as `"1.5"`, `"500m"`, `"2Gi"` or `"1e3"` are parsed into a
//! fixed-point value counted in nano-units, so bound checks compare exactly
//! instead of going through floating point.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Nano-units per whole unit
const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Binary suffixes, checked before decimal ones since they are two characters
const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

/// Decimal suffixes with their power of ten
const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("K", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// A parsed quantity, stored in nano-units
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    nanos: i128,
}

/// Reasons a quantity string can fail to parse
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantityError {
    input: String,
    reason: &'static str,
}

impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid quantity '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for QuantityError {}

impl Quantity {
    /// Value in nano-units (1 = 10^-9 of a unit)
    pub fn nanos(&self) -> i128 {
        self.nanos
    }

    /// Quantity of whole units
    pub fn from_units(units: i64) -> Self {
        Self {
            nanos: i128::from(units) * NANOS_PER_UNIT,
        }
    }

    /// True when `self` lies within `[min, max]` (either bound optional)
    pub fn within(&self, min: Option<&Quantity>, max: Option<&Quantity>) -> bool {
        min.map_or(true, |m| self >= m) && max.map_or(true, |m| self <= m)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_quantity(input)
    }
}

/// Parse a Kubernetes quantity string.
///
/// Accepts a decimal number with an optional binary (`Ki`..`Ei`), decimal
/// (`n`..`E`) or exponent (`e3`, `E-2`) suffix. Values finer than one
/// nano-unit round up, like the API server does. Negative values are
/// rejected.
pub fn parse_quantity(input: &str) -> Result<Quantity, QuantityError> {
    let err = |reason| QuantityError {
        input: input.to_string(),
        reason,
    };
    let s = input.trim();
    if s.is_empty() {
        return Err(err("empty quantity"));
    }

    let (number, scale) = split_suffix(s).ok_or_else(|| err("unknown suffix"))?;
    if number.starts_with('-') {
        return Err(err("negative quantity"));
    }
    let number = number.strip_prefix('+').unwrap_or(number);
    let (mantissa, frac_digits) = parse_decimal(number).ok_or_else(|| err("malformed number"))?;

    let nanos = match scale {
        Scale::Decimal(exp) => scale_decimal(mantissa, exp + 9 - frac_digits),
        Scale::Binary(shift) => 1i128
            .checked_shl(shift)
            .and_then(|mult| mantissa.checked_mul(mult))
            .and_then(|v| div_ceil_pow10(v, frac_digits - 9)),
    }
    .ok_or_else(|| err("value out of range"))?;

    Ok(Quantity { nanos })
}

enum Scale {
    Decimal(i32),
    Binary(u32),
}

fn split_suffix(s: &str) -> Option<(&str, Scale)> {
    for (suffix, shift) in BINARY_SUFFIXES {
        if let Some(number) = s.strip_suffix(suffix) {
            return Some((number, Scale::Binary(shift)));
        }
    }
    // Exponent form: digits, then e/E, then a signed integer
    if let Some(pos) = s.find(['e', 'E']) {
        let (number, exp) = (&s[..pos], &s[pos + 1..]);
        if !exp.is_empty() {
            if let Ok(exp) = exp.parse::<i32>() {
                return Some((number, Scale::Decimal(exp)));
            }
        }
    }
    for (suffix, exp) in DECIMAL_SUFFIXES {
        if let Some(number) = s.strip_suffix(suffix) {
            return Some((number, Scale::Decimal(exp)));
        }
    }
    if s.ends_with(|c: char| c.is_ascii_digit() || c == '.') {
        return Some((s, Scale::Decimal(0)));
    }
    None
}

/// Parse `123.456` into (123456, 3)
fn parse_decimal(number: &str) -> Option<(i128, i32)> {
    let (whole, frac) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{}{}", whole, frac);
    let mantissa = digits.parse::<i128>().ok()?;
    Some((mantissa, i32::try_from(frac.len()).ok()?))
}

fn pow10(exp: i32) -> Option<i128> {
    if exp < 0 {
        return Some(1);
    }
    10i128.checked_pow(u32::try_from(exp).ok()?)
}

/// mantissa * 10^exp, rounding up when exp is negative
fn scale_decimal(mantissa: i128, exp: i32) -> Option<i128> {
    if exp >= 0 {
        mantissa.checked_mul(pow10(exp)?)
    } else {
        div_ceil_pow10(mantissa, -exp)
    }
}

/// value / 10^exp rounded up for a non-negative value; None on overflow
fn div_ceil_pow10(value: i128, exp: i32) -> Option<i128> {
    if exp <= 0 {
        return value.checked_mul(pow10(-exp)?);
    }
    match pow10(exp) {
        Some(div) => (value / div).checked_add(i128::from(value % div != 0)),
        None => Some(i128::from(value > 0)),
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.nanos / NANOS_PER_UNIT;
        let frac = (self.nanos % NANOS_PER_UNIT).abs();
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let frac = format!("{:09}", frac);
            let sign = if self.nanos < 0 && whole == 0 { "-" } else { "" };
            write!(f, "{}{}.{}", sign, whole, frac.trim_end_matches('0'))
        }
    }
}

/// Compare two quantity strings, returning None if either fails to parse
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_quantity(a).ok()?.cmp(&parse_quantity(b).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        parse_quantity(s).unwrap()
    }

    #[test]
    fn cpu_forms_compare_exactly() {
        assert_eq!(q("1.5"), q("1500m"));
        assert!(q("1.5") > q("1"));
        assert!(q("1.5") < q("2"));
        assert_eq!(q("100m").nanos(), 100_000_000);
        assert_eq!(q("0.1"), q("100m"));
    }

    #[test]
    fn memory_suffixes() {
        assert_eq!(q("1Ki").nanos(), 1024 * NANOS_PER_UNIT);
        assert_eq!(q("1Gi"), q("1024Mi"));
        assert!(q("1G") < q("1Gi"));
        assert_eq!(q("1k"), q("1000"));
        assert_eq!(q("1.5Gi"), q("1536Mi"));
    }

    #[test]
    fn exponent_notation() {
        assert_eq!(q("1e3"), q("1k"));
        assert_eq!(q("5E-1"), q("500m"));
        // A bare trailing E is the exa suffix, not an exponent
        assert_eq!(q("1E"), q("1000P"));
    }

    #[test]
    fn sub_nano_values_round_up() {
        assert_eq!(q("1.5n").nanos(), 2);
        assert_eq!(q("1n").nanos(), 1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("abc").is_err());
        assert!(parse_quantity("1.2.3").is_err());
        assert!(parse_quantity("12Xi").is_err());
        assert!(parse_quantity(".").is_err());
        let err = parse_quantity("abc").unwrap_err();
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn rejects_negative_values() {
        let err = parse_quantity("-1").unwrap_err();
        assert!(err.to_string().contains("negative"));
        assert!(parse_quantity("-500m").is_err());
        assert_eq!(q("+2"), q("2"));
    }

    #[test]
    fn oversized_values_are_errors() {
        assert!(parse_quantity("1000000000000000000000000000000000E").is_err());
        assert!(parse_quantity("170141183460469231731687303715884105727Ei").is_err());
        // Long fractions round up without overflowing
        assert_eq!(
            q("0.170141183460469231731687303715884105727").nanos(),
            170_141_184
        );
        assert_eq!(
            q("0.0000000147573952589676412927Ei").nanos(),
            17_014_118_346_046_923_174
        );
    }

    #[test]
    fn within_bounds() {
        let v = q("1.5");
        assert!(v.within(Some(&q("1")), Some(&q("2"))));
        assert!(!v.within(Some(&q("1")), Some(&q("1"))));
        assert!(v.within(None, Some(&q("1.5"))));
        assert!(v.within(Some(&q("1.5")), None));
        assert!(v.within(None, None));
    }

    #[test]
    fn display_is_plain_decimal() {
        assert_eq!(q("1500m").to_string(), "1.5");
        assert_eq!(q("2").to_string(), "2");
        assert_eq!(Quantity::from_units(3).to_string(), "3");
    }

    #[test]
    fn compare_strings() {
        assert_eq!(compare("1", "1000m"), Some(Ordering::Equal));
        assert_eq!(compare("2Gi", "1Gi"), Some(Ordering::Greater));
        assert_eq!(compare("x", "1"), None);
    }
}
