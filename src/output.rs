use std::path::{Path, PathBuf};

use log::info;

use crate::stats::{Comparison, GlucoseRange, MealWindow};
use crate::{Result, UserDataset};

/// `<dir>/<stem>_<user>_<kind>.<ext>` from a prefix such as `out/results.csv`.
fn output_path(base_path: &str, user: &str, kind: &str) -> Result<PathBuf> {
    let path = Path::new(base_path);
    let dir = path.parent().unwrap_or(Path::new("."));

    std::fs::create_dir_all(dir)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("csv");

    Ok(dir.join(format!("{}_{}_{}.{}", stem, user, kind, ext)))
}

fn writer_for(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    info!("Writing results to {}", path.display());
    Ok(csv::Writer::from_path(path)?)
}

fn format_glucose(glucose: f64) -> String {
    if glucose.is_nan() {
        String::new()
    } else {
        format!("{:.3}", glucose)
    }
}

/// The tagged one-minute series. NaN readings are written as empty cells.
pub fn write_glucose_csv(base_path: &str, dataset: &UserDataset) -> Result<PathBuf> {
    let full_path = output_path(base_path, &dataset.user, "glucose")?;
    let mut writer = writer_for(&full_path)?;

    writer.write_record([
        "timestamp",
        "glucose",
        "original_data_point",
        "is_sleep",
        "is_post_prandial",
    ])?;

    for sample in &dataset.glucose {
        writer.write_record([
            sample.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            format_glucose(sample.glucose),
            sample.is_original_point.to_string(),
            sample.is_sleep.to_string(),
            sample.is_post_prandial.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(full_path)
}

/// Time-in-range per subset, plus original readings split by post-meal
/// window.
pub fn write_comparison_csv(
    base_path: &str,
    user: &str,
    comparisons: &[Comparison],
) -> Result<PathBuf> {
    let full_path = output_path(base_path, user, "ranges")?;
    let mut writer = writer_for(&full_path)?;

    writer.write_record([
        "comparison",
        "subset",
        "range",
        "percent_time",
        "hours",
        "post_prandial_readings",
        "baseline_readings",
    ])?;

    for comparison in comparisons {
        let name = format!("{}_vs_{}", comparison.first.name, comparison.second.name);
        for subset in [&comparison.first, &comparison.second] {
            for range in GlucoseRange::ALL {
                writer.write_record([
                    name.clone(),
                    subset.name.clone(),
                    range.label().to_string(),
                    format!("{:.1}", subset.ranges.percent(range)),
                    format!("{:.2}", subset.ranges.hours(range)),
                    subset.post_prandial.count(range).to_string(),
                    subset.baseline.count(range).to_string(),
                ])?;
            }
        }
    }

    writer.flush()?;
    Ok(full_path)
}

/// Glucose traces after each meal, in minutes since the meal started.
pub fn write_meal_windows_csv(
    base_path: &str,
    user: &str,
    windows: &[MealWindow],
) -> Result<PathBuf> {
    let full_path = output_path(base_path, user, "meals")?;
    let mut writer = writer_for(&full_path)?;

    writer.write_record(["meal_start", "meal", "minute", "glucose"])?;

    for window in windows {
        let start = window.start.format("%Y-%m-%d %H:%M").to_string();
        let label = window.label().unwrap_or_default();
        for (minute, glucose) in &window.glucose {
            writer.write_record([
                start.clone(),
                label.to_string(),
                minute.to_string(),
                format_glucose(*glucose),
            ])?;
        }
    }

    writer.flush()?;
    Ok(full_path)
}
