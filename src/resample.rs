use chrono::{Duration, NaiveDateTime};
use log::{debug, info};

use crate::{Error, GlucoseSample, Result};

/// Readings further apart than this are treated as a break in the series.
pub const GAP_THRESHOLD_MINUTES: i64 = 20;
/// Offset of the NaN marker inserted after the reading that opens a gap.
pub const GAP_MARKER_OFFSET_MINUTES: i64 = 10;
pub const GRID_STEP_SECONDS: i64 = 60;

/// Indices `i` where `series[i]` follows `series[i - 1]` by more than the
/// gap threshold.
pub fn detect_gaps(series: &[(NaiveDateTime, f64)]) -> Vec<usize> {
    let threshold = Duration::minutes(GAP_THRESHOLD_MINUTES);
    series
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1].0 - pair[0].0 > threshold)
        .map(|(i, _)| i + 1)
        .collect()
}

/// Copies the series, emitting a NaN reading `GAP_MARKER_OFFSET_MINUTES`
/// after the last reading before every gap so interpolation cannot run
/// across it.
pub fn bridge_gaps(series: &[(NaiveDateTime, f64)]) -> Vec<(NaiveDateTime, f64)> {
    let gaps = detect_gaps(series);
    let mut bridged = Vec::with_capacity(series.len() + gaps.len());
    let mut gaps = gaps.into_iter().peekable();

    for (i, &point) in series.iter().enumerate() {
        if gaps.next_if_eq(&i).is_some() {
            let marker = series[i - 1].0 + Duration::minutes(GAP_MARKER_OFFSET_MINUTES);
            log_gap(series[i - 1].0, point.0);
            bridged.push((marker, f64::NAN));
        }
        bridged.push(point);
    }

    bridged
}

fn log_gap(from: NaiveDateTime, to: NaiveDateTime) {
    debug!(
        "Gap of {} minutes between {} and {}",
        (to - from).num_minutes(),
        from.format("%Y-%m-%d %H:%M"),
        to.format("%Y-%m-%d %H:%M")
    );
}

/// Linear interpolation on one span. NaN anchors propagate.
fn interpolate(x0: i64, y0: f64, x1: i64, y1: f64, t: i64) -> f64 {
    let dx = (x1 - x0) as f64;
    if dx == 0.0 {
        return y0;
    }
    let slope = (y1 - y0) / dx;
    slope * (t - x0) as f64 + y0
}

/// Resamples a sorted series onto a one-minute grid spanning its first to
/// last timestamp inclusive.
///
/// A grid point `t` takes the span ending at the first anchor at or after
/// `t` (the first span for `t` equal to the first anchor), so a NaN anchor
/// blanks both of its neighbouring spans including the right-hand anchor.
pub fn resample(series: &[(NaiveDateTime, f64)]) -> Result<Vec<GlucoseSample>> {
    let n = series.len();
    if n < 2 {
        return Err(Error::InsufficientData(n));
    }

    let xs: Vec<i64> = series.iter().map(|(t, _)| t.and_utc().timestamp()).collect();
    let first = series[0].0;
    let grid_len = usize::try_from((xs[n - 1] - xs[0]) / GRID_STEP_SECONDS + 1).unwrap_or(0);

    let mut samples = Vec::with_capacity(grid_len);
    let mut span = 1;
    let mut anchor = 0;

    for step in 0..grid_len as i64 {
        let t = xs[0] + step * GRID_STEP_SECONDS;

        while span < n - 1 && xs[span] < t {
            span += 1;
        }
        let glucose = interpolate(
            xs[span - 1],
            series[span - 1].1,
            xs[span],
            series[span].1,
            t,
        );

        while anchor < n && xs[anchor] < t {
            anchor += 1;
        }
        let is_original_point = anchor < n && xs[anchor] == t;

        samples.push(GlucoseSample {
            timestamp: first + Duration::seconds(step * GRID_STEP_SECONDS),
            glucose,
            is_original_point,
            is_sleep: false,
            is_post_prandial: false,
        });
    }

    Ok(samples)
}

/// Gap bridging followed by resampling.
pub fn resample_glucose(series: &[(NaiveDateTime, f64)]) -> Result<Vec<GlucoseSample>> {
    if series.len() < 2 {
        return Err(Error::InsufficientData(series.len()));
    }

    let bridged = bridge_gaps(series);
    let samples = resample(&bridged)?;

    info!(
        "Resampled {} readings ({} gaps bridged) to {} one-minute samples",
        series.len(),
        bridged.len() - series.len(),
        samples.len()
    );
    Ok(samples)
}
