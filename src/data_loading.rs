use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::Deserialize;

use crate::time_parser::parse_glucose_timestamp;
use crate::{Error, RawGlucoseSample, Result};

#[derive(Debug, Deserialize)]
struct GlucoseRow {
    #[serde(rename = "Time")]
    time: String,
    #[serde(rename = "Historic Glucose (mmol/L)", default)]
    historic: Option<f64>,
    #[serde(rename = "Scan Glucose (mmol/L)", default)]
    scan: Option<f64>,
}

/// One row of a hand-kept event log. `finish` or `duration` is present
/// depending on how the log was written.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecordRow {
    #[serde(rename = "Start")]
    pub start: String,
    #[serde(rename = "Finish", default)]
    pub finish: Option<String>,
    #[serde(rename = "duration", alias = "Duration", default)]
    pub duration: Option<String>,
    #[serde(rename = "Event")]
    pub event: String,
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {}", path.display(), e),
        ))
    })
}

/// Reads the tab-separated CGM export.
pub fn read_glucose_file(path: &Path) -> Result<Vec<RawGlucoseSample>> {
    info!("Loading glucose readings: {}", path.display());
    read_glucose(open(path)?)
}

pub fn read_glucose<R: Read>(reader: R) -> Result<Vec<RawGlucoseSample>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true) // exports pad some rows with trailing columns
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut samples = Vec::new();

    for result in rdr.deserialize() {
        let row: GlucoseRow = result?;
        samples.push(RawGlucoseSample {
            timestamp: parse_glucose_timestamp(&row.time)?,
            historic_value: row.historic,
            scan_value: row.scan,
        });
    }

    debug!("Read {} glucose rows", samples.len());
    Ok(samples)
}

/// Reads a comma-separated event log.
pub fn read_records_file(path: &Path) -> Result<Vec<RawRecordRow>> {
    info!("Loading event records: {}", path.display());
    read_records(open(path)?)
}

pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecordRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let rows = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<RawRecordRow>, _>>()?;

    debug!("Read {} record rows", rows.len());
    Ok(rows)
}

/// Restricts readings to `(start, end]`, sorts them by time and resolves
/// each row to a single value (NaN when neither column is filled).
pub fn prepare_glucose_series(
    samples: &[RawGlucoseSample],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> Vec<(NaiveDateTime, f64)> {
    let mut series: Vec<(NaiveDateTime, f64)> = samples
        .iter()
        .filter(|s| start.map_or(true, |start| s.timestamp > start))
        .filter(|s| end.map_or(true, |end| s.timestamp <= end))
        .map(|s| (s.timestamp, s.value()))
        .collect();

    series.sort_by_key(|(t, _)| *t);

    let missing = series.iter().filter(|(_, v)| v.is_nan()).count();
    if missing > 0 {
        debug!("{} readings have neither a historic nor a scan value", missing);
    }

    series
}
