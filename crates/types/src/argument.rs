//! Operation arguments.
//!
//! Arguments arrive either as text or as numbers. Numbers digest as their
//! decimal text, so `5000` and `"5000"` are the same argument while `"001"`
//! and `"1"` stay distinct. Value thresholds read numeric text as a number.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A single operation argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    /// Numeric argument.
    Number(f64),
    /// Free-form text argument.
    Text(String),
}

impl Argument {
    /// Create a text argument.
    pub fn text(value: impl Into<String>) -> Self {
        Argument::Text(value.into())
    }

    /// Create a numeric argument.
    pub fn number(value: f64) -> Self {
        Argument::Number(value)
    }

    /// Numeric value of this argument, if it has one.
    ///
    /// Text counts only when the whole string is a finite number.
    pub fn numeric_value(&self) -> Option<f64> {
        match self {
            Argument::Number(n) if n.is_finite() => Some(*n),
            Argument::Number(_) => None,
            Argument::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Text form used for digesting.
    ///
    /// Text is taken verbatim. Numbers use their display form, which drops
    /// the fraction of integral values and prints negative zero as `0`.
    pub fn canonical_text(&self) -> Cow<'_, str> {
        match self {
            Argument::Text(s) => Cow::Borrowed(s),
            Argument::Number(_) => Cow::Owned(self.to_string()),
        }
    }

    /// Text content, if this is a text argument.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Argument::Text(s) => Some(s),
            Argument::Number(_) => None,
        }
    }

    /// Whether this is a text argument that is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        matches!(self, Argument::Text(s) if s.trim().is_empty())
    }

    /// Parse a leading decimal number, ignoring whatever trails it.
    ///
    /// `"1500.5 units"` yields `1500.5`; `"abc"` yields `None`.
    pub fn leading_float(&self) -> Option<f64> {
        match self {
            Argument::Number(n) => Some(*n).filter(|n| !n.is_nan()),
            Argument::Text(s) => leading_float(s),
        }
    }

    /// Parse a leading integer, ignoring whatever trails it.
    ///
    /// `"250kg"` yields `250`; `"kg"` yields `None`.
    pub fn leading_int(&self) -> Option<i64> {
        match self {
            Argument::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            Argument::Number(_) => None,
            Argument::Text(s) => leading_int(s),
        }
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Argument::Text(value.to_string())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Argument::Text(value)
    }
}

impl From<f64> for Argument {
    fn from(value: f64) -> Self {
        Argument::Number(value)
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Argument::Number(value as f64)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Text(s) => f.write_str(s),
            Argument::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Argument::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Split off an optional sign and return the remainder with the sign factor.
fn strip_sign(s: &str) -> (f64, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (-1.0, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (1.0, rest)
    } else {
        (1.0, s)
    }
}

fn leading_float(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    let (_, unsigned) = strip_sign(trimmed);
    let sign_len = trimmed.len() - unsigned.len();
    let bytes = unsigned.as_bytes();

    let mut end = 0;
    let mut int_digits = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        int_digits += 1;
    }

    let mut frac_digits = 0;
    if end < bytes.len() && bytes[end] == b'.' {
        let mut probe = end + 1;
        while probe < bytes.len() && bytes[probe].is_ascii_digit() {
            probe += 1;
            frac_digits += 1;
        }
        if frac_digits > 0 || int_digits > 0 {
            end = probe;
        }
    }

    if int_digits == 0 && frac_digits == 0 {
        return None;
    }

    // Exponent only counts when followed by at least one digit.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut probe = end + 1;
        if probe < bytes.len() && (bytes[probe] == b'+' || bytes[probe] == b'-') {
            probe += 1;
        }
        let exp_start = probe;
        while probe < bytes.len() && bytes[probe].is_ascii_digit() {
            probe += 1;
        }
        if probe > exp_start {
            end = probe;
        }
    }

    trimmed[..sign_len + end].parse::<f64>().ok()
}

fn leading_int(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let (sign, unsigned) = strip_sign(trimmed);
    let digits: &str = {
        let len = unsigned
            .bytes()
            .take_while(|b| b.is_ascii_digit())
            .count();
        &unsigned[..len]
    };
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits.bytes().fold(0i64, |acc, b| {
        acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
    });
    Some(if sign < 0.0 { -magnitude } else { magnitude })
}
