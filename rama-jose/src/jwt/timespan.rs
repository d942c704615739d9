use jiff::SignedDuration;

use crate::JoseError;

const MINUTE: f64 = 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

fn unit_seconds(unit: &str) -> Option<f64> {
    Some(match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR,
        _ => return None,
    })
}

fn is_number(value: &str) -> bool {
    match value.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && !frac.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()),
    }
}

/// Parse a human readable time span such as `"30s"`, `"1 minute"`, `"1.5h"`,
/// `"2 days ago"` or `"-3w"`, rounded to whole seconds.
///
/// Units are case insensitive. A year is 365.25 days. A leading `-` or a
/// trailing `ago` makes the span negative.
pub fn parse_timespan(span: &str) -> Result<SignedDuration, JoseError> {
    let invalid = || JoseError::configuration(format!("invalid time span {span:?}"));

    let lower = span.to_ascii_lowercase();
    let (negative, rest) = match lower.as_bytes().first() {
        Some(b'-') => (true, lower.get(1..).unwrap_or_default()),
        Some(b'+') => (false, lower.get(1..).unwrap_or_default()),
        _ => (false, lower.as_str()),
    };
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    let (ago, rest) = if let Some(rest) = rest.strip_suffix(" ago") {
        (true, rest)
    } else {
        (false, rest.strip_suffix(" from now").unwrap_or(rest))
    };

    let number_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(invalid)?;
    let (number, unit) = rest.split_at(number_len);
    if !is_number(number) {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_err| invalid())?;
    let unit = unit.strip_prefix(' ').unwrap_or(unit);
    let seconds = (value * unit_seconds(unit).ok_or_else(invalid)?).round();

    let seconds = if negative || ago { -seconds } else { seconds };
    SignedDuration::try_from_secs_f64(seconds).map_err(|err| invalid().with_source(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units() {
        for (span, seconds) in [
            ("30s", 30),
            ("30 seconds", 30),
            ("1 minute", 60),
            ("2mins", 120),
            ("1.5h", 5400),
            ("2d", 172_800),
            ("3w", 1_814_400),
            ("1y", 31_557_600),
            ("1 Hour", 3600),
        ] {
            assert_eq!(
                parse_timespan(span).unwrap(),
                SignedDuration::from_secs(seconds),
                "{span}"
            );
        }
    }

    #[test]
    fn direction() {
        assert_eq!(parse_timespan("-5s").unwrap(), SignedDuration::from_secs(-5));
        assert_eq!(parse_timespan("5s ago").unwrap(), SignedDuration::from_secs(-5));
        assert_eq!(parse_timespan("+5s").unwrap(), SignedDuration::from_secs(5));
        assert_eq!(parse_timespan("5s from now").unwrap(), SignedDuration::from_secs(5));
    }

    #[test]
    fn rounding() {
        assert_eq!(parse_timespan("1.5s").unwrap(), SignedDuration::from_secs(2));
        assert_eq!(parse_timespan("0.4s").unwrap(), SignedDuration::ZERO);
    }

    #[test]
    fn invalid_spans_are_configuration_errors() {
        for span in ["", "s", "10", "1.s", ".5s", "1..5s", "10 parsecs", "ten seconds", "5  s"] {
            let err = parse_timespan(span).unwrap_err();
            assert!(err.is_configuration(), "{span}");
        }
    }
}
