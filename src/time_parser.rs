use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Timestamp format of the CGM export, shared by every user.
pub const GLUCOSE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

const MONTH_NAMES: [(&str, &str); 13] = [
    ("jan", "January"),
    ("feb", "February"),
    ("mar", "March"),
    ("apr", "April"),
    ("may", "May"),
    ("jun", "June"),
    ("jul", "July"),
    ("aug", "August"),
    ("sep", "September"),
    ("sept", "September"),
    ("oct", "October"),
    ("nov", "November"),
    ("dec", "December"),
];

pub fn parse_glucose_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    parse_with(raw, raw, GLUCOSE_TIME_FORMAT)
}

/// How a user's event log writes its timestamps. Each person's log was kept
/// by hand in a different layout, so the set is closed and chosen per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordFormat {
    /// `05 June 07:30 PM`, no year in the log.
    DayMonthClock { year: i32 },
    /// `5 Sept 19:30`, abbreviated month names that need spelling out first.
    AbbreviatedMonth { year: i32 },
    /// `2018-06-05 19:30` start plus a `duration` column in minutes.
    StartDuration,
}

impl RecordFormat {
    /// chrono format applied after any year suffix or month expansion.
    pub fn pattern(&self) -> &'static str {
        match self {
            RecordFormat::DayMonthClock { .. } => "%d %B %I:%M %p %Y",
            RecordFormat::AbbreviatedMonth { .. } => "%d %B %H:%M %Y",
            RecordFormat::StartDuration => "%Y-%m-%d %H:%M",
        }
    }

    pub fn parse_record_timestamp(&self, raw: &str) -> Result<NaiveDateTime> {
        let raw = raw.trim();
        match *self {
            RecordFormat::DayMonthClock { year } => {
                parse_with(raw, &format!("{} {}", raw, year), self.pattern())
            }
            RecordFormat::AbbreviatedMonth { year } => parse_with(
                raw,
                &format!("{} {}", expand_month_names(raw), year),
                self.pattern(),
            ),
            RecordFormat::StartDuration => parse_with(raw, raw, self.pattern()),
        }
    }

    /// Finish of a record: parsed from the `Finish` column, or derived from
    /// `start + duration` for logs that record durations instead.
    pub fn resolve_finish(
        &self,
        start: NaiveDateTime,
        finish: Option<&str>,
        duration: Option<&str>,
    ) -> Result<NaiveDateTime> {
        match self {
            RecordFormat::StartDuration => {
                let raw = non_empty(duration)
                    .ok_or_else(|| Error::Format("record has no duration".to_string()))?;
                let minutes: f64 = raw
                    .parse()
                    .map_err(|_| Error::Format(format!("invalid duration {:?}", raw)))?;
                if !minutes.is_finite() || minutes < 0.0 {
                    return Err(Error::Format(format!("invalid duration {:?}", raw)));
                }
                Duration::try_seconds((minutes * 60.0).round() as i64)
                    .and_then(|delta| start.checked_add_signed(delta))
                    .ok_or_else(|| Error::Format(format!("duration {:?} out of range", raw)))
            }
            _ => {
                let raw = non_empty(finish)
                    .ok_or_else(|| Error::Format("record has no finish time".to_string()))?;
                self.parse_record_timestamp(raw)
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_with(raw: &str, candidate: &str, format: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(candidate, format).map_err(|source| Error::Parse {
        value: raw.to_string(),
        format: format.to_string(),
        source,
    })
}

/// Replaces abbreviated month tokens (`Jun`, `Sept.`) with full names.
fn expand_month_names(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| {
            let key = token.trim_end_matches('.').to_ascii_lowercase();
            MONTH_NAMES
                .iter()
                .find(|(abbr, _)| *abbr == key)
                .map(|(_, full)| *full)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn glucose_timestamps_use_slash_dates() {
        let ts = parse_glucose_timestamp("2018/06/05 23:59").unwrap();
        assert_eq!(ts, at(2018, 6, 5, 23, 59));
    }

    #[test]
    fn day_month_clock_fills_in_year() {
        let format = RecordFormat::DayMonthClock { year: 2018 };
        assert_eq!(
            format.parse_record_timestamp("05 June 07:30 PM").unwrap(),
            at(2018, 6, 5, 19, 30)
        );
        assert_eq!(
            format.parse_record_timestamp("6 June 12:05 AM").unwrap(),
            at(2018, 6, 6, 0, 5)
        );
    }

    #[test]
    fn abbreviated_months_are_expanded() {
        let format = RecordFormat::AbbreviatedMonth { year: 2018 };
        assert_eq!(
            format.parse_record_timestamp("5 Sept 19:30").unwrap(),
            at(2018, 9, 5, 19, 30)
        );
        assert_eq!(
            format.parse_record_timestamp("12 jun. 07:00").unwrap(),
            at(2018, 6, 12, 7, 0)
        );
        assert_eq!(expand_month_names("1 Dec 10:00"), "1 December 10:00");
    }

    #[test]
    fn start_duration_derives_finish() {
        let format = RecordFormat::StartDuration;
        let start = format.parse_record_timestamp("2018-06-05 23:30").unwrap();
        let finish = format.resolve_finish(start, None, Some("45")).unwrap();
        assert_eq!(finish, at(2018, 6, 6, 0, 15));
    }

    #[test]
    fn finish_column_is_parsed_with_the_same_format() {
        let format = RecordFormat::DayMonthClock { year: 2018 };
        let start = format.parse_record_timestamp("05 June 11:00 PM").unwrap();
        let finish = format
            .resolve_finish(start, Some("06 June 07:15 AM"), None)
            .unwrap();
        assert_eq!(finish, at(2018, 6, 6, 7, 15));
    }

    #[test]
    fn mismatched_string_is_a_parse_error() {
        let format = RecordFormat::DayMonthClock { year: 2018 };
        let err = format.parse_record_timestamp("2018-06-05 19:30").unwrap_err();
        match err {
            Error::Parse { value, format, .. } => {
                assert_eq!(value, "2018-06-05 19:30");
                assert_eq!(format, "%d %B %I:%M %p %Y");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse_glucose_timestamp("05/06/2018").is_err());
    }

    #[test]
    fn missing_duration_is_a_format_error() {
        let format = RecordFormat::StartDuration;
        let start = format.parse_record_timestamp("2018-06-05 10:00").unwrap();
        assert!(matches!(
            format.resolve_finish(start, None, Some(" ")),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            format.resolve_finish(start, None, Some("-5")),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn out_of_range_duration_is_a_format_error() {
        let format = RecordFormat::StartDuration;
        let start = format.parse_record_timestamp("2018-06-05 10:00").unwrap();
        for raw in ["99999999999999", "1e300"] {
            assert!(
                matches!(format.resolve_finish(start, None, Some(raw)), Err(Error::Format(_))),
                "duration {raw}"
            );
        }
    }

    #[test]
    fn record_format_is_selected_by_config_key() {
        let format: RecordFormat =
            serde_json::from_str(r#"{"kind":"day_month_clock","year":2018}"#).unwrap();
        assert_eq!(format, RecordFormat::DayMonthClock { year: 2018 });
        let format: RecordFormat = serde_json::from_str(r#"{"kind":"start_duration"}"#).unwrap();
        assert_eq!(format, RecordFormat::StartDuration);
    }
}
