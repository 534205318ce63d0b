//! Human-friendly duration and budget parsing.
//!
//! Durations are written as repeated `<integer><unit>` tokens (`4h`, `2h30m`,
//! `1h15m30s`). Budgets are non-negative decimal amounts in USD.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::DreamwatchError;

static DURATION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*([hms])").expect("duration token regex is valid"));

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Parse a duration such as `"2h30m"` by summing every `<n><unit>` token.
///
/// Tokens may repeat and appear in any order. Input with no tokens, or whose
/// tokens sum to zero, is rejected.
pub fn parse_duration(input: &str) -> Result<Duration, DreamwatchError> {
    let invalid = || DreamwatchError::InvalidFormat(input.to_string());

    let mut total_ms: u64 = 0;
    for caps in DURATION_TOKEN.captures_iter(input) {
        let value: u64 = caps[1].parse().map_err(|_| invalid())?;
        let unit_ms = match &caps[2] {
            "h" => MS_PER_HOUR,
            "m" => MS_PER_MINUTE,
            _ => MS_PER_SECOND,
        };
        total_ms = value
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
    }

    if total_ms == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_millis(total_ms))
}

/// Format a duration as space-separated `h`/`m`/`s` components.
///
/// Seconds are dropped once an hour component is present; an all-zero
/// duration formats as `"0s"`.
pub fn format_duration(duration: Duration) -> String {
    let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / MS_PER_SECOND;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 && hours == 0 {
        parts.push(format!("{seconds}s"));
    }

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

/// Budget value as supplied by a caller: raw text (CLI) or a number (config).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BudgetInput<'a> {
    Text(&'a str),
    Amount(f64),
}

impl<'a> From<&'a str> for BudgetInput<'a> {
    fn from(value: &'a str) -> Self {
        BudgetInput::Text(value)
    }
}

impl From<f64> for BudgetInput<'_> {
    fn from(value: f64) -> Self {
        BudgetInput::Amount(value)
    }
}

/// Parse a budget amount, rejecting non-numeric, non-finite, and negative values.
pub fn parse_budget<'a>(value: impl Into<BudgetInput<'a>>) -> Result<f64, DreamwatchError> {
    let (amount, raw) = match value.into() {
        BudgetInput::Text(text) => (text.trim().parse::<f64>().ok(), text.to_string()),
        BudgetInput::Amount(amount) => (Some(amount), amount.to_string()),
    };
    match amount {
        Some(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        _ => Err(DreamwatchError::InvalidAmount(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(duration: Duration) -> u128 {
        duration.as_millis()
    }

    #[test]
    fn parses_single_units() {
        assert_eq!(ms(parse_duration("4h").expect("hours")), 4 * 3_600_000);
        assert_eq!(ms(parse_duration("30m").expect("minutes")), 30 * 60_000);
        assert_eq!(ms(parse_duration("45s").expect("seconds")), 45_000);
    }

    #[test]
    fn parses_mixed_tokens_in_any_order() {
        let forward = parse_duration("2h30m").expect("forward");
        let reversed = parse_duration("30m2h").expect("reversed");
        assert_eq!(forward, reversed);
        assert_eq!(ms(forward), (2 * 3_600 + 30 * 60) * 1_000);
        assert_eq!(
            ms(parse_duration("1h15m30s").expect("complex")),
            (3_600 + 15 * 60 + 30) * 1_000
        );
    }

    #[test]
    fn repeated_tokens_accumulate() {
        assert_eq!(ms(parse_duration("1h1h").expect("repeat")), 2 * 3_600_000);
    }

    #[test]
    fn rejects_input_without_tokens() {
        for input in ["", "xyz", "invalid", "h", "0h", "0m0s"] {
            let err = parse_duration(input).unwrap_err();
            assert_eq!(err, DreamwatchError::InvalidFormat(input.to_string()));
        }
    }

    #[test]
    fn rejects_overflowing_values() {
        let err = parse_duration("99999999999999999999h").unwrap_err();
        assert!(matches!(err, DreamwatchError::InvalidFormat(_)));
    }

    #[test]
    fn formats_components() {
        assert_eq!(format_duration(Duration::from_secs(4 * 3_600)), "4h");
        assert_eq!(format_duration(Duration::from_secs(2 * 3_600 + 30 * 60)), "2h 30m");
        assert_eq!(format_duration(Duration::from_secs(45 * 60)), "45m");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(999)), "0s");
    }

    #[test]
    fn format_drops_seconds_once_hours_present() {
        assert_eq!(format_duration(Duration::from_secs(3_600 + 30)), "1h");
        assert_eq!(format_duration(Duration::from_secs(3_600 + 60 + 30)), "1h 1m");
    }

    #[test]
    fn parses_budgets() {
        assert_eq!(parse_budget(10.0), Ok(10.0));
        assert_eq!(parse_budget("5.50"), Ok(5.5));
        assert_eq!(parse_budget(" 0 "), Ok(0.0));
        assert_eq!(parse_budget(2.25), Ok(2.25));
    }

    #[test]
    fn rejects_invalid_budgets() {
        assert!(matches!(parse_budget(-5.0), Err(DreamwatchError::InvalidAmount(_))));
        assert!(matches!(parse_budget("-1"), Err(DreamwatchError::InvalidAmount(_))));
        assert!(matches!(parse_budget("abc"), Err(DreamwatchError::InvalidAmount(_))));
        assert!(matches!(parse_budget(f64::NAN), Err(DreamwatchError::InvalidAmount(_))));
        assert!(matches!(parse_budget("inf"), Err(DreamwatchError::InvalidAmount(_))));
    }
}
