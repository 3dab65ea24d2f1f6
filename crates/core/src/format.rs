//! Display formatting for prices and percentages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed decimals with `,` between thousands groups.
///
/// Negative inputs keep their sign after rounding, so `-0.001` at two
/// decimals is `"-0.00"`.
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 + 1);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    // Sign follows the input even when rounding leaves only zeros ("-0.00")
    let mut out = String::with_capacity(grouped.len() + decimals + 2);
    if value.is_sign_negative() {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// `format_number` followed by a currency symbol, e.g. `1,234.50 ₽`
pub fn format_currency(value: f64, symbol: &str, decimals: usize) -> String {
    format!("{} {}", format_number(value, decimals), symbol)
}

/// Format a fraction as a percentage (0.01 is 1%).
///
/// Smaller moves get more decimals: 3 below 0.1%, 2 below 1%, 1 below 10%,
/// none above that.
pub fn format_percentage(fraction: f64, include_sign: bool) -> String {
    let pct = fraction * 100.0;
    let decimals = match pct.abs() {
        p if p < 0.1 => 3,
        p if p < 1.0 => 2,
        p if p < 10.0 => 1,
        _ => 0,
    };
    let sign = if include_sign && pct > 0.0 { "+" } else { "" };
    format!("{}{:.*}%", sign, decimals, pct)
}

/// Price direction used to colour values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    /// Hex colour for the direction
    pub fn color(&self) -> &'static str {
        match self {
            Trend::Up => "#4CAF50",
            Trend::Down => "#F44336",
            Trend::Flat => "#FFC107",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Flat => "flat",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1_234_567.891, 2), "1,234,567.89");
        assert_eq!(format_number(999.0, 2), "999.00");
        assert_eq!(format_number(1000.0, 0), "1,000");
        assert_eq!(format_number(-98_765.4, 1), "-98,765.4");
        assert_eq!(format_number(0.0, 2), "0.00");
        assert_eq!(format_number(-0.001, 2), "-0.00");
        assert_eq!(format_number(-0.0, 1), "-0.0");
        assert_eq!(format_number(-1234.4, 0), "-1,234");
        assert_eq!(format_number(f64::NAN, 2), "NaN");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1234.5, "₽", 2), "1,234.50 ₽");
        assert_eq!(format_currency(59_000.0, "$", 0), "59,000 $");
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(0.0123, true), "+1.2%");
        assert_eq!(format_percentage(0.0005, true), "+0.050%");
        assert_eq!(format_percentage(-0.003, true), "-0.30%");
        assert_eq!(format_percentage(0.5, true), "+50%");
        assert_eq!(format_percentage(0.5, false), "50%");
        assert_eq!(format_percentage(0.0, true), "0.000%");
    }

    #[test]
    fn test_trend_colors() {
        assert_eq!(Trend::from_change(1.0), Trend::Up);
        assert_eq!(Trend::from_change(-0.5), Trend::Down);
        assert_eq!(Trend::from_change(0.0), Trend::Flat);
        assert_eq!(Trend::Up.color(), "#4CAF50");
        assert_eq!(Trend::Down.color(), "#F44336");
        assert_eq!(Trend::Flat.to_string(), "flat");
    }
}
