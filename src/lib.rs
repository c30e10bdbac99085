pub mod cache;
pub mod config;
pub mod data_loading;
pub mod error;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod resample;
pub mod stats;
pub mod tagging;
pub mod time_parser;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Sleep,
    Meal,
    Activity,
}

/// One logged event interval, `start <= finish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub start: NaiveDateTime,
    pub finish: NaiveDateTime,
    pub event_type: EventType,
    pub event_details: String,
}

/// A row of the raw CGM export. Historic and scan readings are mutually
/// exclusive per row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawGlucoseSample {
    pub timestamp: NaiveDateTime,
    pub historic_value: Option<f64>,
    pub scan_value: Option<f64>,
}

impl RawGlucoseSample {
    /// Historic reading if present, else the scan reading, else NaN.
    pub fn value(&self) -> f64 {
        self.historic_value.or(self.scan_value).unwrap_or(f64::NAN)
    }
}

/// A sample on the uniform one-minute grid.
#[derive(Debug, Clone, Copy)]
pub struct GlucoseSample {
    pub timestamp: NaiveDateTime,
    pub glucose: f64, // mmol/L, NaN where the series is broken
    pub is_original_point: bool,
    pub is_sleep: bool,
    pub is_post_prandial: bool,
}

// Bitwise comparison of the reading so NaN samples compare equal to themselves.
impl PartialEq for GlucoseSample {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.glucose.to_bits() == other.glucose.to_bits()
            && self.is_original_point == other.is_original_point
            && self.is_sleep == other.is_sleep
            && self.is_post_prandial == other.is_post_prandial
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDataset {
    pub user: String,
    pub records: Vec<EventRecord>,
    pub glucose: Vec<GlucoseSample>,
}

impl UserDataset {
    pub fn records_of(&self, event_type: EventType) -> impl Iterator<Item = &EventRecord> + '_ {
        self.records
            .iter()
            .filter(move |r| r.event_type == event_type)
    }

    pub fn original_points(&self) -> impl Iterator<Item = &GlucoseSample> + '_ {
        self.glucose.iter().filter(|s| s.is_original_point)
    }
}
