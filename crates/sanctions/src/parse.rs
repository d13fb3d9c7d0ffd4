//! Sanction duration grammar.
//!
//! `<N>w`, `<N>d`, `<N>h` and `<N>m` components, each optional, in that
//! order, summed. Parsing stops at the first character that doesn't fit the
//! grammar, so `"1h spam"` is one hour and `""` is zero.

use std::{sync::LazyLock, time::Duration};

use regex::Regex;

use crate::{Error, Result};

const MINUTE_SECS: u64 = 60;
const HOUR_SECS: u64 = 60 * MINUTE_SECS;
const DAY_SECS: u64 = 24 * HOUR_SECS;
const WEEK_SECS: u64 = 7 * DAY_SECS;

#[allow(clippy::expect_used)]
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?").expect("literal pattern")
});

/// Parse a sanction duration.
///
/// Leading whitespace is skipped. Only numeric overflow is an error.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim_start();
    let Some(caps) = DURATION_RE.captures(trimmed) else {
        return Ok(Duration::ZERO);
    };

    let units = [WEEK_SECS, DAY_SECS, HOUR_SECS, MINUTE_SECS];
    let mut total: u64 = 0;
    for (group, unit) in units.into_iter().enumerate() {
        let Some(m) = caps.get(group + 1) else {
            continue;
        };
        let value: u64 = m
            .as_str()
            .parse()
            .map_err(|_| Error::invalid_duration(input, "number too large"))?;
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| Error::invalid_duration(input, "duration too long"))?;
    }

    // Expiry timestamps are epoch millis in a u64.
    if total.checked_mul(1_000).is_none() {
        return Err(Error::invalid_duration(input, "duration too long"));
    }
    Ok(Duration::from_secs(total))
}

/// Render as "1 week, 2 days, 3 hours, 4 minutes", skipping zero parts.
#[must_use]
pub fn humanize(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    let mut parts = Vec::new();
    for (unit, name) in [
        (WEEK_SECS, "week"),
        (DAY_SECS, "day"),
        (HOUR_SECS, "hour"),
        (MINUTE_SECS, "minute"),
    ] {
        let count = secs / unit;
        secs %= unit;
        match count {
            0 => {},
            1 => parts.push(format!("1 {name}")),
            n => parts.push(format!("{n} {name}s")),
        }
    }
    if parts.is_empty() {
        "0 minutes".into()
    } else {
        parts.join(", ")
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("1w2d3h4m", WEEK_SECS + 2 * DAY_SECS + 3 * HOUR_SECS + 4 * MINUTE_SECS)]
    #[case("", 0)]
    #[case("30m", 30 * MINUTE_SECS)]
    #[case("2d", 2 * DAY_SECS)]
    #[case("1w4m", WEEK_SECS + 4 * MINUTE_SECS)]
    #[case("1h spamming", HOUR_SECS)]
    #[case("  12h", 12 * HOUR_SECS)]
    #[case("spam", 0)]
    #[case("4m1h", 4 * MINUTE_SECS)]
    #[case("90m", 90 * MINUTE_SECS)]
    fn parses(#[case] input: &str, #[case] secs: u64) {
        assert_eq!(parse_duration(input).unwrap(), Duration::from_secs(secs));
    }

    #[rstest]
    #[case("99999999999999999999999w")]
    #[case("30000000000000000w")]
    fn overflow_is_validation_error(#[case] input: &str) {
        let err = parse_duration(input).unwrap_err();
        assert!(matches!(err, Error::InvalidDuration { .. }));
    }

    #[rstest]
    #[case(Duration::ZERO, "0 minutes")]
    #[case(Duration::from_secs(MINUTE_SECS), "1 minute")]
    #[case(Duration::from_secs(WEEK_SECS + 2 * DAY_SECS + 3 * HOUR_SECS + 4 * MINUTE_SECS), "1 week, 2 days, 3 hours, 4 minutes")]
    #[case(Duration::from_secs(2 * HOUR_SECS), "2 hours")]
    fn humanizes(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(humanize(duration), expected);
    }
}
