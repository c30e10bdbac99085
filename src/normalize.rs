use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::data_loading::RawRecordRow;
use crate::time_parser::RecordFormat;
use crate::{Error, EventRecord, EventType, Result};

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sleep" => Ok(EventType::Sleep),
            "meal" => Ok(EventType::Meal),
            "activity" => Ok(EventType::Activity),
            _ => Err(Error::Format(format!(
                "unknown event type {:?}, expected Sleep, Meal or Activity",
                s.trim()
            ))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Sleep => "Sleep",
            EventType::Meal => "Meal",
            EventType::Activity => "Activity",
        };
        f.write_str(name)
    }
}

/// Splits `"<Type> : <Details>"` on its first colon.
pub fn split_event(event: &str) -> Result<(EventType, String)> {
    let (kind, details) = event
        .split_once(':')
        .ok_or_else(|| Error::Format(format!("event {:?} has no ':' separator", event)))?;
    Ok((kind.parse()?, details.trim().to_string()))
}

/// Turns raw log rows into typed records, keeping the file's row order.
pub fn normalize_records(rows: &[RawRecordRow], format: RecordFormat) -> Result<Vec<EventRecord>> {
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        let start = format.parse_record_timestamp(&row.start)?;
        let finish =
            format.resolve_finish(start, row.finish.as_deref(), row.duration.as_deref())?;
        if finish < start {
            return Err(Error::Format(format!(
                "record finishes at {} before it starts at {}",
                finish, start
            )));
        }
        let (event_type, event_details) = split_event(&row.event)?;

        records.push(EventRecord {
            start,
            finish,
            event_type,
            event_details,
        });
    }

    debug!("Normalized {} records", records.len());
    Ok(records)
}
