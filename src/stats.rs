use chrono::{Datelike, NaiveDateTime, Weekday};

use crate::tagging::{window_end, DEFAULT_POST_PRANDIAL_MINUTES};
use crate::{EventRecord, EventType, GlucoseSample, UserDataset};

/// Glucose bands used for time-in-range reporting. Lower bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlucoseRange {
    Below2,
    From2To4,
    From4To6,
    From6To8,
    From8To10,
    Above10,
}

impl GlucoseRange {
    pub const ALL: [GlucoseRange; 6] = [
        GlucoseRange::Below2,
        GlucoseRange::From2To4,
        GlucoseRange::From4To6,
        GlucoseRange::From6To8,
        GlucoseRange::From8To10,
        GlucoseRange::Above10,
    ];

    /// `None` for NaN readings.
    pub fn classify(glucose: f64) -> Option<Self> {
        if glucose.is_nan() {
            return None;
        }
        let range = if glucose < 2.0 {
            GlucoseRange::Below2
        } else if glucose < 4.0 {
            GlucoseRange::From2To4
        } else if glucose < 6.0 {
            GlucoseRange::From4To6
        } else if glucose < 8.0 {
            GlucoseRange::From6To8
        } else if glucose < 10.0 {
            GlucoseRange::From8To10
        } else {
            GlucoseRange::Above10
        };
        Some(range)
    }

    pub fn label(&self) -> &'static str {
        match self {
            GlucoseRange::Below2 => "< 2 mmol/L",
            GlucoseRange::From2To4 => "2 - 4 mmol/L",
            GlucoseRange::From4To6 => "4 - 6 mmol/L",
            GlucoseRange::From6To8 => "6 - 8 mmol/L",
            GlucoseRange::From8To10 => "8 - 10 mmol/L",
            GlucoseRange::Above10 => "> 10 mmol/L",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Sample counts per glucose band. On the one-minute grid a count is also
/// a number of minutes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeBreakdown {
    counts: [usize; 6],
}

impl RangeBreakdown {
    pub fn from_samples<'a, I>(samples: I) -> Self
    where
        I: IntoIterator<Item = &'a GlucoseSample>,
    {
        let mut breakdown = RangeBreakdown::default();
        for sample in samples {
            if let Some(range) = GlucoseRange::classify(sample.glucose) {
                breakdown.counts[range.index()] += 1;
            }
        }
        breakdown
    }

    pub fn count(&self, range: GlucoseRange) -> usize {
        self.counts[range.index()]
    }

    /// Samples that fell in any band (NaN readings excluded).
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn hours(&self, range: GlucoseRange) -> f64 {
        self.count(range) as f64 / 60.0
    }

    /// Share of `range` over every counted sample, the `< 2` band included.
    /// Returns 0 when nothing was counted.
    pub fn percent(&self, range: GlucoseRange) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(range) as f64 * 100.0 / total as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubsetSummary {
    pub name: String,
    pub samples: usize,
    /// Every sample of the subset, interpolated ones included.
    pub ranges: RangeBreakdown,
    /// Original readings only, split by post-meal window.
    pub post_prandial: RangeBreakdown,
    pub baseline: RangeBreakdown,
}

impl SubsetSummary {
    pub fn from_samples(name: &str, samples: &[&GlucoseSample]) -> Self {
        let originals = || samples.iter().copied().filter(|s| s.is_original_point);
        SubsetSummary {
            name: name.to_string(),
            samples: samples.len(),
            ranges: RangeBreakdown::from_samples(samples.iter().copied()),
            post_prandial: RangeBreakdown::from_samples(originals().filter(|s| s.is_post_prandial)),
            baseline: RangeBreakdown::from_samples(originals().filter(|s| !s.is_post_prandial)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub first: SubsetSummary,
    pub second: SubsetSummary,
}

impl Comparison {
    fn split<F>(
        samples: &[GlucoseSample],
        first_name: &str,
        second_name: &str,
        in_first: F,
    ) -> Self
    where
        F: Fn(&GlucoseSample) -> bool,
    {
        let (first, second): (Vec<&GlucoseSample>, Vec<&GlucoseSample>) =
            samples.iter().partition(|s| in_first(*s));
        Comparison {
            first: SubsetSummary::from_samples(first_name, &first),
            second: SubsetSummary::from_samples(second_name, &second),
        }
    }
}

pub fn compare_sleep_awake(dataset: &UserDataset) -> Comparison {
    Comparison::split(&dataset.glucose, "sleep", "awake", |s| s.is_sleep)
}

/// Weekday against weekend samples, leaving out the given days of month.
pub fn compare_weekday_weekend(dataset: &UserDataset, exclude_days: &[u32]) -> Comparison {
    let kept: Vec<GlucoseSample> = dataset
        .glucose
        .iter()
        .filter(|s| !exclude_days.contains(&s.timestamp.day()))
        .copied()
        .collect();
    Comparison::split(&kept, "weekday", "weekend", |s| {
        !matches!(s.timestamp.weekday(), Weekday::Sat | Weekday::Sun)
    })
}

/// A record positioned relative to a window start.
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeRecord {
    pub start_minutes: f64,
    pub finish_minutes: f64,
    pub event_type: EventType,
    pub event_details: String,
}

/// Glucose and records around one meal, in minutes since `start`.
#[derive(Debug, Clone, PartialEq)]
pub struct MealWindow {
    pub start: NaiveDateTime,
    pub window_minutes: i64,
    pub glucose: Vec<(f64, f64)>,
    pub records: Vec<RelativeRecord>,
}

impl MealWindow {
    /// Details of the first record in the window, normally the meal itself.
    pub fn label(&self) -> Option<&str> {
        self.records.first().map(|r| r.event_details.as_str())
    }
}

fn minutes_since(start: NaiveDateTime, t: NaiveDateTime) -> f64 {
    (t - start).num_seconds() as f64 / 60.0
}

/// Samples and records whose offset from `start` lies in `[0, window]`.
pub fn meal_window(dataset: &UserDataset, start: NaiveDateTime, window_minutes: i64) -> MealWindow {
    let end = window_end(start, window_minutes);
    let glucose = dataset
        .glucose
        .iter()
        .filter(|s| s.timestamp >= start && s.timestamp <= end)
        .map(|s| (minutes_since(start, s.timestamp), s.glucose))
        .collect();
    let records = dataset
        .records
        .iter()
        .filter(|r| r.start >= start && r.start <= end)
        .map(|r: &EventRecord| RelativeRecord {
            start_minutes: minutes_since(start, r.start),
            finish_minutes: minutes_since(start, r.finish),
            event_type: r.event_type,
            event_details: r.event_details.clone(),
        })
        .collect();

    MealWindow {
        start,
        window_minutes,
        glucose,
        records,
    }
}

/// One window per logged meal, using the default post-prandial length.
pub fn meal_windows(dataset: &UserDataset) -> Vec<MealWindow> {
    dataset
        .records_of(EventType::Meal)
        .map(|r| meal_window(dataset, r.start, DEFAULT_POST_PRANDIAL_MINUTES))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 6, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn sample(timestamp: NaiveDateTime, glucose: f64) -> GlucoseSample {
        GlucoseSample {
            timestamp,
            glucose,
            is_original_point: true,
            is_sleep: false,
            is_post_prandial: false,
        }
    }

    #[test]
    fn classifies_with_inclusive_lower_bounds() {
        assert_eq!(GlucoseRange::classify(1.9), Some(GlucoseRange::Below2));
        assert_eq!(GlucoseRange::classify(2.0), Some(GlucoseRange::From2To4));
        assert_eq!(GlucoseRange::classify(7.99), Some(GlucoseRange::From6To8));
        assert_eq!(GlucoseRange::classify(10.0), Some(GlucoseRange::Above10));
        assert_eq!(GlucoseRange::classify(f64::NAN), None);
        assert_eq!(GlucoseRange::From4To6.label(), "4 - 6 mmol/L");
    }

    #[test]
    fn percentages_ignore_nan_samples() {
        let samples = vec![
            sample(at(5, 0, 0), 5.0),
            sample(at(5, 0, 1), 5.5),
            sample(at(5, 0, 2), 9.0),
            sample(at(5, 0, 3), f64::NAN),
        ];
        let breakdown = RangeBreakdown::from_samples(&samples);
        assert_eq!(breakdown.total(), 3);
        assert!((breakdown.percent(GlucoseRange::From4To6) - 200.0 / 3.0).abs() < 1e-9);
        assert!((breakdown.hours(GlucoseRange::From8To10) - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(RangeBreakdown::default().percent(GlucoseRange::Above10), 0.0);
    }

    #[test]
    fn splits_sleep_from_awake() {
        let mut glucose = vec![sample(at(5, 1, 0), 5.0), sample(at(5, 9, 0), 7.0)];
        glucose[0].is_sleep = true;
        glucose[1].is_post_prandial = true;
        let dataset = UserDataset {
            user: "u".to_string(),
            records: Vec::new(),
            glucose,
        };

        let comparison = compare_sleep_awake(&dataset);
        assert_eq!(comparison.first.name, "sleep");
        assert_eq!(comparison.first.samples, 1);
        assert_eq!(comparison.first.baseline.count(GlucoseRange::From4To6), 1);
        assert_eq!(comparison.second.post_prandial.count(GlucoseRange::From6To8), 1);
        assert_eq!(comparison.second.baseline.total(), 0);
    }

    #[test]
    fn weekend_split_honours_excluded_days() {
        // 2018-06-09 is a Saturday, 2018-06-11 a Monday.
        let glucose = vec![
            sample(at(9, 12, 0), 5.0),
            sample(at(11, 12, 0), 5.0),
            sample(at(16, 12, 0), 5.0),
        ];
        let dataset = UserDataset {
            user: "u".to_string(),
            records: Vec::new(),
            glucose,
        };

        let comparison = compare_weekday_weekend(&dataset, &[16]);
        assert_eq!(comparison.first.samples, 1);
        assert_eq!(comparison.second.samples, 1);
    }

    #[test]
    fn meal_window_is_relative_to_start() {
        let glucose: Vec<_> = (0..200).map(|m| sample(at(5, 10, 0) + Duration::minutes(m), 6.0)).collect();
        let records = vec![
            EventRecord {
                start: at(5, 11, 0),
                finish: at(5, 11, 20),
                event_type: EventType::Meal,
                event_details: "Lunch".to_string(),
            },
            EventRecord {
                start: at(5, 12, 0),
                finish: at(5, 12, 30),
                event_type: EventType::Activity,
                event_details: "Walk".to_string(),
            },
        ];
        let dataset = UserDataset {
            user: "u".to_string(),
            records,
            glucose,
        };

        let windows = meal_windows(&dataset);
        assert_eq!(windows.len(), 1);
        let window = &windows[0];
        assert_eq!(window.label(), Some("Lunch"));
        assert_eq!(window.glucose.len(), 121);
        assert_eq!(window.glucose[0].0, 0.0);
        assert_eq!(window.glucose[120].0, 120.0);
        assert_eq!(window.records.len(), 2);
        assert_eq!(window.records[1].start_minutes, 60.0);
        assert_eq!(window.records[1].finish_minutes, 90.0);
    }

    #[test]
    fn oversized_meal_window_runs_to_the_end_of_the_series() {
        let glucose: Vec<_> = (0..5).map(|m| sample(at(5, 10, 0) + Duration::minutes(m), 6.0)).collect();
        let dataset = UserDataset {
            user: "u".to_string(),
            records: Vec::new(),
            glucose,
        };

        let window = meal_window(&dataset, at(5, 10, 2), i64::MAX);
        assert_eq!(window.glucose.len(), 3);
    }
}
