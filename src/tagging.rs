use chrono::{Duration, NaiveDateTime};
use log::debug;

use crate::{EventRecord, EventType, GlucoseSample};

pub const DEFAULT_POST_PRANDIAL_MINUTES: i64 = 120;
/// Longest post-meal window a configuration may ask for.
pub const MAX_POST_PRANDIAL_MINUTES: i64 = 24 * 60;

/// Membership of each timestamp in a union of intervals that are open at
/// their start and closed at their finish, `(start, finish]`.
///
/// Both inputs must be sorted ascending and the intervals must not overlap;
/// overlapping intervals are not detected. One forward sweep: the interval
/// cursor never moves back, so the cost is `O(timestamps + intervals)`.
pub fn sweep_intervals(
    timestamps: &[NaiveDateTime],
    intervals: &[(NaiveDateTime, NaiveDateTime)],
) -> Vec<bool> {
    let mut inside = vec![false; timestamps.len()];
    let (mut i, mut j) = (0, 0);

    while i < timestamps.len() && j < intervals.len() {
        let (start, finish) = intervals[j];
        if timestamps[i] > finish {
            // Current sample is past this interval.
            j += 1;
            continue;
        }
        if timestamps[i] > start {
            inside[i] = true;
        }
        i += 1;
    }

    inside
}

/// Sleep intervals `(start, finish]` from the sleep records.
pub fn sleep_intervals(records: &[EventRecord]) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    records
        .iter()
        .filter(|r| r.event_type == EventType::Sleep)
        .map(|r| (r.start, r.finish))
        .collect()
}

/// `start + minutes`, saturating at the last representable instant.
pub(crate) fn window_end(start: NaiveDateTime, minutes: i64) -> NaiveDateTime {
    Duration::try_minutes(minutes)
        .and_then(|window| start.checked_add_signed(window))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Post-meal windows `(start, start + window]` from the meal records.
pub fn post_prandial_intervals(
    records: &[EventRecord],
    window_minutes: i64,
) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    records
        .iter()
        .filter(|r| r.event_type == EventType::Meal)
        .map(|r| (r.start, window_end(r.start, window_minutes)))
        .collect()
}

/// Returns a copy of `samples` with `is_sleep` and `is_post_prandial` set.
/// `records` must already be sorted by start.
pub fn tag_samples(
    samples: &[GlucoseSample],
    records: &[EventRecord],
    post_prandial_minutes: i64,
) -> Vec<GlucoseSample> {
    let timestamps: Vec<NaiveDateTime> = samples.iter().map(|s| s.timestamp).collect();
    let sleep = sweep_intervals(&timestamps, &sleep_intervals(records));
    let post_prandial = sweep_intervals(
        &timestamps,
        &post_prandial_intervals(records, post_prandial_minutes),
    );

    let tagged: Vec<GlucoseSample> = samples
        .iter()
        .zip(sleep.iter().zip(post_prandial.iter()))
        .map(|(sample, (&is_sleep, &is_post_prandial))| GlucoseSample {
            is_sleep,
            is_post_prandial,
            ..*sample
        })
        .collect();

    debug!(
        "Tagged {} sleep and {} post-prandial samples out of {}",
        sleep.iter().filter(|&&t| t).count(),
        post_prandial.iter().filter(|&&t| t).count(),
        tagged.len()
    );
    tagged
}
