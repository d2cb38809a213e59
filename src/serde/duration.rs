//! ISO-8601 text encoding for [`Duration`] values, e.g. `PT1H30M` or `P2DT0.5S`.
//!
//! Only components with a fixed length are supported: days (and weeks, when parsing),
//! hours, minutes and seconds, the latter with up to nanosecond precision.
//! Use it on struct fields with `#[serde(with = "eventually_docstore::serde::duration")]`,
//! or with the [option] module for `Option<Duration>` fields.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;
const SECONDS_PER_WEEK: u64 = 7 * SECONDS_PER_DAY;
const NANOS_DIGITS: usize = 9;

/// All possible error types returned by [parse].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    /// The text does not start with `P`.
    #[error("duration '{0}' must start with the 'P' designator")]
    MissingDesignator(String),

    /// The text has no components after the designators.
    #[error("duration '{0}' has no components")]
    Empty(String),

    /// A component is malformed, repeated, or out of order.
    #[error("duration '{input}' has an invalid component '{component}'")]
    InvalidComponent {
        /// The full text being parsed.
        input: String,
        /// The offending component.
        component: String,
    },

    /// The text uses years or months, which have no fixed length.
    #[error("duration '{0}' uses calendar components, which have no fixed length")]
    CalendarComponent(String),

    /// The duration does not fit in a [`Duration`].
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// Formats the duration in its canonical ISO-8601 form.
///
/// Zero components are left out, and the zero duration is `PT0S`.
pub fn format(duration: &Duration) -> String {
    let total_seconds = duration.as_secs();
    let nanos = duration.subsec_nanos();

    let days = total_seconds / SECONDS_PER_DAY;
    let hours = (total_seconds % SECONDS_PER_DAY) / SECONDS_PER_HOUR;
    let minutes = (total_seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = total_seconds % SECONDS_PER_MINUTE;

    let mut text = String::from("P");

    if days > 0 {
        text.push_str(&format!("{days}D"));
    }

    let has_time = hours > 0 || minutes > 0 || seconds > 0 || nanos > 0;

    if has_time || days == 0 {
        text.push('T');
    }

    if hours > 0 {
        text.push_str(&format!("{hours}H"));
    }

    if minutes > 0 {
        text.push_str(&format!("{minutes}M"));
    }

    if seconds > 0 || nanos > 0 || (!has_time && days == 0) {
        text.push_str(&seconds.to_string());

        if nanos > 0 {
            let fraction = format!("{nanos:09}");
            text.push('.');
            text.push_str(fraction.trim_end_matches('0'));
        }

        text.push('S');
    }

    text
}

/// Parses an ISO-8601 duration such as `PT1H30M`, `P1DT12H` or `PT0.25S`.
///
/// # Errors
///
/// Returns a [`DurationError`] if the text is not a valid duration, or if it uses
/// year or month components.
pub fn parse(input: &str) -> Result<Duration, DurationError> {
    let rest = input
        .strip_prefix('P')
        .ok_or_else(|| DurationError::MissingDesignator(input.to_owned()))?;

    let (date, time) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    if date.is_empty() && time.map_or(true, str::is_empty) {
        return Err(DurationError::Empty(input.to_owned()));
    }

    let invalid = |component: &str| DurationError::InvalidComponent {
        input: input.to_owned(),
        component: component.to_owned(),
    };

    let overflow = || DurationError::Overflow(input.to_owned());

    let mut seconds: u64 = 0;
    let mut nanos: u32 = 0;

    // Units are listed in the order they must appear.
    let mut last_date_unit = 0;
    for (number, unit) in components(date, &invalid)? {
        let (position, scale) = match unit {
            'Y' | 'M' => return Err(DurationError::CalendarComponent(input.to_owned())),
            'W' => (1, SECONDS_PER_WEEK),
            'D' => (2, SECONDS_PER_DAY),
            _ => return Err(invalid(number)),
        };

        if position <= last_date_unit {
            return Err(invalid(number));
        }

        last_date_unit = position;
        seconds = integer(number, &invalid)?
            .checked_mul(scale)
            .and_then(|value| seconds.checked_add(value))
            .ok_or_else(overflow)?;
    }

    if let Some(time) = time {
        if time.is_empty() {
            return Err(invalid("T"));
        }

        let mut last_time_unit = 0;
        for (number, unit) in components(time, &invalid)? {
            let (position, scale) = match unit {
                'H' => (1, SECONDS_PER_HOUR),
                'M' => (2, SECONDS_PER_MINUTE),
                'S' => (3, 1),
                _ => return Err(invalid(number)),
            };

            if position <= last_time_unit {
                return Err(invalid(number));
            }

            last_time_unit = position;

            let whole = match number.split_once('.') {
                Some((whole, fraction)) if unit == 'S' => {
                    nanos = fraction_to_nanos(fraction).ok_or_else(|| invalid(number))?;
                    whole
                }
                Some(_) => return Err(invalid(number)),
                None => number,
            };

            seconds = integer(whole, &invalid)?
                .checked_mul(scale)
                .and_then(|value| seconds.checked_add(value))
                .ok_or_else(overflow)?;
        }
    }

    Ok(Duration::new(seconds, nanos))
}

/// Splits a list of `<number><unit>` components, such as `1H30M`.
fn components<'a, F>(text: &'a str, invalid: &F) -> Result<Vec<(&'a str, char)>, DurationError>
where
    F: Fn(&str) -> DurationError,
{
    let mut result = Vec::new();
    let mut start = 0;

    for (index, c) in text.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }

        let number = &text[start..index];
        if number.is_empty() {
            return Err(invalid(&text[start..]));
        }

        result.push((number, c));
        start = index + c.len_utf8();
    }

    if start != text.len() {
        return Err(invalid(&text[start..]));
    }

    Ok(result)
}

fn integer<F>(number: &str, invalid: &F) -> Result<u64, DurationError>
where
    F: Fn(&str) -> DurationError,
{
    if number.is_empty() {
        return Err(invalid(number));
    }

    number.parse::<u64>().map_err(|_| invalid(number))
}

fn fraction_to_nanos(fraction: &str) -> Option<u32> {
    if fraction.is_empty()
        || fraction.len() > NANOS_DIGITS
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    format!("{:0<width$}", fraction, width = NANOS_DIGITS)
        .parse()
        .ok()
}

/// Serializes a [`Duration`] as ISO-8601 text.
///
/// # Errors
///
/// Returns the error of the underlying [Serializer].
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(duration))
}

/// Deserializes a [`Duration`] from ISO-8601 text.
///
/// # Errors
///
/// Returns an error if the value is not a string holding a valid duration.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse(&text).map_err(serde::de::Error::custom)
}

/// Same encoding as the parent module, for `Option<Duration>` fields.
///
/// Combine it with `#[serde(default)]` so that omitted fields decode into `None`.
pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes an optional [`Duration`] as ISO-8601 text, or `null`.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying [Serializer].
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&super::format(duration)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes an optional [`Duration`] from ISO-8601 text, or `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither `null` nor a valid duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|text| super::parse(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_formats_canonical_durations() {
        let cases = [
            (Duration::ZERO, "PT0S"),
            (Duration::from_secs(45), "PT45S"),
            (Duration::from_secs(90), "PT1M30S"),
            (Duration::from_secs(2 * SECONDS_PER_HOUR), "PT2H"),
            (Duration::from_secs(SECONDS_PER_DAY), "P1D"),
            (Duration::from_secs(SECONDS_PER_DAY + 1), "P1DT1S"),
            (Duration::from_millis(250), "PT0.25S"),
            (Duration::new(61, 1), "PT1M1.000000001S"),
        ];

        for (duration, expected) in cases {
            assert_eq!(expected, format(&duration), "formatting {duration:?}");
        }
    }

    #[test]
    fn it_parses_durations() {
        let cases = [
            ("PT0S", Duration::ZERO),
            ("PT1H30M", Duration::from_secs(90 * 60)),
            ("P1DT12H", Duration::from_secs(36 * SECONDS_PER_HOUR)),
            ("P2W", Duration::from_secs(14 * SECONDS_PER_DAY)),
            ("PT0.5S", Duration::from_millis(500)),
            ("PT100M", Duration::from_secs(6000)),
            ("P3D", Duration::from_secs(3 * SECONDS_PER_DAY)),
        ];

        for (text, expected) in cases {
            assert_eq!(Ok(expected), parse(text), "parsing {text}");
        }
    }

    #[test]
    fn formatted_durations_parse_back() {
        let duration = Duration::new(3 * SECONDS_PER_DAY + 4 * SECONDS_PER_HOUR + 5, 600_000);

        assert_eq!(Ok(duration), parse(&format(&duration)));
    }

    #[test]
    fn it_rejects_invalid_durations() {
        assert_eq!(
            Err(DurationError::MissingDesignator("1H".to_owned())),
            parse("1H")
        );
        assert_eq!(Err(DurationError::Empty("P".to_owned())), parse("P"));
        assert_eq!(Err(DurationError::Empty("PT".to_owned())), parse("PT"));
        assert_eq!(
            Err(DurationError::CalendarComponent("P1Y".to_owned())),
            parse("P1Y")
        );
        assert_eq!(
            Err(DurationError::CalendarComponent("P2M".to_owned())),
            parse("P2M")
        );

        for text in ["PTS", "PT1M2H", "PT1.5M", "PT1H1H", "PT5", "PT1.S", "P1DT"] {
            assert!(
                matches!(parse(text), Err(DurationError::InvalidComponent { .. })),
                "{text} should be invalid"
            );
        }
    }

    #[test]
    fn it_detects_overflows() {
        assert_eq!(
            Err(DurationError::Overflow("P99999999999999999D".to_owned())),
            parse("P99999999999999999D")
        );
    }
}
