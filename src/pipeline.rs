use log::info;

use crate::config::UserConfig;
use crate::data_loading::{prepare_glucose_series, read_glucose_file, read_records_file};
use crate::normalize::normalize_records;
use crate::resample::resample_glucose;
use crate::tagging::tag_samples;
use crate::{Result, UserDataset};

/// Builds a user's dataset from their raw files: parse and normalize the
/// event log, resample the glucose readings, then tag sleep and post-meal
/// samples.
pub fn build_dataset(user: &UserConfig) -> Result<UserDataset> {
    info!("Building dataset for {}", user.name);

    let raw_glucose = read_glucose_file(&user.glucose_path)?;
    let series = prepare_glucose_series(&raw_glucose, user.start_date, user.end_date);
    let resampled = resample_glucose(&series)?;

    let rows = read_records_file(&user.records_path)?;
    let mut records = normalize_records(&rows, user.record_format)?;
    records.sort_by_key(|r| r.start);

    let glucose = tag_samples(&resampled, &records, user.post_prandial_window_minutes);

    info!(
        "{}: {} records, {} glucose samples from {} to {}",
        user.name,
        records.len(),
        glucose.len(),
        glucose
            .first()
            .map(|s| s.timestamp.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        glucose
            .last()
            .map(|s| s.timestamp.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default()
    );

    Ok(UserDataset {
        user: user.name.clone(),
        records,
        glucose,
    })
}
