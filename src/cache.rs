//! On-disk cache of built datasets, one directory per user.
//!
//! `glucose.arrow` holds the tagged series as an Arrow IPC file so float
//! bits (NaN included) survive exactly; `records.cbor` holds the event
//! records. The cache is never invalidated automatically: delete the user's
//! directory after editing their raw files.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::ipc::reader::FileReaderBuilder;
use arrow::ipc::writer::{FileWriter, IpcWriteOptions};
use arrow::ipc::CompressionType;
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::UserConfig;
use crate::pipeline::build_dataset;
use crate::{Error, EventRecord, GlucoseSample, Result, UserDataset};

pub const RECORDS_FILE: &str = "records.cbor";
pub const GLUCOSE_FILE: &str = "glucose.arrow";

#[derive(Debug, Serialize, Deserialize)]
struct RecordsArtifact {
    user: String,
    records: Vec<EventRecord>,
}

pub struct DatasetCache {
    root: PathBuf,
}

impl DatasetCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn user_dir(&self, user: &str) -> PathBuf {
        self.root.join(user)
    }

    pub fn records_path(&self, user: &str) -> PathBuf {
        self.user_dir(user).join(RECORDS_FILE)
    }

    pub fn glucose_path(&self, user: &str) -> PathBuf {
        self.user_dir(user).join(GLUCOSE_FILE)
    }

    /// Returns the cached dataset for `user`, building and storing it from
    /// the raw files on a miss.
    pub fn get_dataset(&self, user: &UserConfig) -> Result<UserDataset> {
        if let Some(dataset) = self.load(&user.name)? {
            info!(
                "Cache hit for {} ({})",
                user.name,
                self.user_dir(&user.name).display()
            );
            return Ok(dataset);
        }

        info!("Cache miss for {}, reading raw files", user.name);
        let dataset = build_dataset(user)?;
        self.store(&dataset)?;
        Ok(dataset)
    }

    /// `Ok(None)` when nothing is cached for the user. A lone artifact or
    /// one that fails to decode is reported as corruption.
    pub fn load(&self, user: &str) -> Result<Option<UserDataset>> {
        let records_path = self.records_path(user);
        let glucose_path = self.glucose_path(user);

        match (records_path.exists(), glucose_path.exists()) {
            (false, false) => Ok(None),
            (true, false) => Err(missing_partner(&glucose_path)),
            (false, true) => Err(missing_partner(&records_path)),
            (true, true) => {
                let artifact = read_records(&records_path)?;
                if artifact.user != user {
                    return Err(Error::CacheCorruption {
                        path: records_path,
                        reason: format!("holds records for {:?}", artifact.user),
                    });
                }
                let glucose = read_glucose(&glucose_path)?;
                Ok(Some(UserDataset {
                    user: artifact.user,
                    records: artifact.records,
                    glucose,
                }))
            }
        }
    }

    /// Both artifacts are staged before either is renamed into place. If
    /// the second rename fails the first artifact is removed again, so a
    /// failed store leaves an empty cache rather than a lone artifact.
    pub fn store(&self, dataset: &UserDataset) -> Result<()> {
        let glucose_path = self.glucose_path(&dataset.user);
        let records_path = self.records_path(&dataset.user);
        fs::create_dir_all(self.user_dir(&dataset.user))?;

        let glucose_tmp = stage_glucose(&glucose_path, &dataset.glucose)?;
        let records_tmp = match stage_records(&records_path, &dataset.user, &dataset.records) {
            Ok(tmp) => tmp,
            Err(e) => {
                let _ = fs::remove_file(&glucose_tmp);
                return Err(e);
            }
        };
        if let Err(e) = commit(&glucose_tmp, &glucose_path) {
            let _ = fs::remove_file(&glucose_tmp);
            let _ = fs::remove_file(&records_tmp);
            return Err(e);
        }
        if let Err(e) = commit(&records_tmp, &records_path) {
            let _ = fs::remove_file(&records_tmp);
            let _ = fs::remove_file(&glucose_path);
            return Err(e);
        }
        info!(
            "Cached {} records and {} glucose samples for {}",
            dataset.records.len(),
            dataset.glucose.len(),
            dataset.user
        );
        Ok(())
    }
}

fn missing_partner(path: &Path) -> Error {
    Error::CacheCorruption {
        path: path.to_path_buf(),
        reason: "missing while its sibling artifact exists".to_string(),
    }
}

fn corrupt(path: &Path, reason: impl ToString) -> Error {
    Error::CacheCorruption {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

/// Writes the artifact for `path` to a sibling temp file and returns it.
/// The temp file is removed if writing fails.
fn stage(path: &Path, write: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<PathBuf> {
    let tmp = staging_path(path);
    let written = File::create(&tmp).map_err(Error::from).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        Ok(())
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

/// Renames a staged artifact into place, so a reader never sees a
/// half-written file.
fn commit(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn stage_records(path: &Path, user: &str, records: &[EventRecord]) -> Result<PathBuf> {
    let artifact = RecordsArtifact {
        user: user.to_string(),
        records: records.to_vec(),
    };
    stage(path, |writer| {
        ciborium::into_writer(&artifact, writer).map_err(|e| Error::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })
}

fn read_records(path: &Path) -> Result<RecordsArtifact> {
    let file = File::open(path)?;
    ciborium::from_reader(BufReader::new(file)).map_err(|e| corrupt(path, e))
}

pub fn glucose_schema() -> Schema {
    Schema::new(vec![
        Field::new("timestamp", DataType::Timestamp(TimeUnit::Second, None), false),
        Field::new("glucose", DataType::Float64, false),
        Field::new("original_data_point", DataType::Boolean, false),
        Field::new("is_sleep", DataType::Boolean, false),
        Field::new("is_post_prandial", DataType::Boolean, false),
    ])
}

pub fn write_glucose(path: &Path, samples: &[GlucoseSample]) -> Result<()> {
    let tmp = stage_glucose(path, samples)?;
    commit(&tmp, path)
}

fn stage_glucose(path: &Path, samples: &[GlucoseSample]) -> Result<PathBuf> {
    let schema = Arc::new(glucose_schema());

    let timestamps: Vec<i64> = samples
        .iter()
        .map(|s| s.timestamp.and_utc().timestamp())
        .collect();
    let glucose: Vec<f64> = samples.iter().map(|s| s.glucose).collect();
    let flag = |f: fn(&GlucoseSample) -> bool| -> ArrayRef {
        Arc::new(BooleanArray::from(samples.iter().map(f).collect::<Vec<bool>>()))
    };

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(TimestampSecondArray::from(timestamps)) as ArrayRef,
            Arc::new(Float64Array::from(glucose)) as ArrayRef,
            flag(|s| s.is_original_point),
            flag(|s| s.is_sleep),
            flag(|s| s.is_post_prandial),
        ],
    )?;

    let options = IpcWriteOptions::default().try_with_compression(Some(CompressionType::ZSTD))?;
    stage(path, |writer| {
        let mut ipc = FileWriter::try_new_with_options(writer, &schema, options)?;
        ipc.write(&batch)?;
        ipc.finish()?;
        Ok(())
    })
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> std::result::Result<&'a T, String> {
    let array = batch
        .column_by_name(name)
        .ok_or_else(|| format!("{} column missing", name))?;
    if array.null_count() > 0 {
        return Err(format!("{} column has nulls", name));
    }
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("{} column has type {}", name, array.data_type()))
}

fn decode_batch(batch: &RecordBatch, samples: &mut Vec<GlucoseSample>) -> std::result::Result<(), String> {
    let timestamps = column::<TimestampSecondArray>(batch, "timestamp")?;
    let glucose = column::<Float64Array>(batch, "glucose")?;
    let original = column::<BooleanArray>(batch, "original_data_point")?;
    let sleep = column::<BooleanArray>(batch, "is_sleep")?;
    let post_prandial = column::<BooleanArray>(batch, "is_post_prandial")?;

    for row in 0..batch.num_rows() {
        let secs = timestamps.value(row);
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| format!("timestamp {} out of range", secs))?
            .naive_utc();
        samples.push(GlucoseSample {
            timestamp,
            glucose: glucose.value(row),
            is_original_point: original.value(row),
            is_sleep: sleep.value(row),
            is_post_prandial: post_prandial.value(row),
        });
    }
    Ok(())
}

pub fn read_glucose(path: &Path) -> Result<Vec<GlucoseSample>> {
    let file = File::open(path)?;
    let reader = FileReaderBuilder::new()
        .build(BufReader::new(file))
        .map_err(|e| corrupt(path, e))?;
    let mut samples = Vec::new();

    for batch in reader {
        let batch = batch.map_err(|e| corrupt(path, e))?;
        decode_batch(&batch, &mut samples).map_err(|reason| corrupt(path, reason))?;
    }

    debug!("Read {} glucose samples from {}", samples.len(), path.display());
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 6, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn dataset() -> UserDataset {
        let glucose = vec![
            GlucoseSample {
                timestamp: at(5, 23, 59),
                glucose: 6.2,
                is_original_point: true,
                is_sleep: true,
                is_post_prandial: false,
            },
            GlucoseSample {
                timestamp: at(6, 0, 0),
                glucose: f64::NAN,
                is_original_point: false,
                is_sleep: true,
                is_post_prandial: false,
            },
            GlucoseSample {
                timestamp: at(6, 0, 1),
                glucose: 6.0,
                is_original_point: false,
                is_sleep: false,
                is_post_prandial: true,
            },
        ];
        let records = vec![
            EventRecord {
                start: at(5, 23, 0),
                finish: at(6, 0, 0),
                event_type: EventType::Sleep,
                event_details: "Night".to_string(),
            },
            EventRecord {
                start: at(6, 0, 0),
                finish: at(6, 0, 20),
                event_type: EventType::Meal,
                event_details: "Midnight snack: toast".to_string(),
            },
        ];
        UserDataset {
            user: "praveen".to_string(),
            records,
            glucose,
        }
    }

    #[test]
    fn round_trips_every_field_including_nan() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        let original = dataset();

        cache.store(&original).unwrap();
        let loaded = cache.load("praveen").unwrap().expect("cached dataset");

        assert_eq!(loaded, original);
        assert!(loaded.glucose[1].glucose.is_nan());
        assert_eq!(
            loaded.glucose[1].glucose.to_bits(),
            original.glucose[1].glucose.to_bits()
        );
    }

    #[test]
    fn missing_cache_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        assert!(cache.load("praveen").unwrap().is_none());
    }

    #[test]
    fn garbage_artifact_is_reported_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        cache.store(&dataset()).unwrap();

        fs::write(cache.glucose_path("praveen"), b"not an arrow file").unwrap();
        let err = cache.load("praveen").unwrap_err();
        match err {
            Error::CacheCorruption { path, .. } => assert_eq!(path, cache.glucose_path("praveen")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lone_artifact_is_reported_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        cache.store(&dataset()).unwrap();

        fs::remove_file(cache.records_path("praveen")).unwrap();
        assert!(matches!(
            cache.load("praveen"),
            Err(Error::CacheCorruption { .. })
        ));
    }

    #[test]
    fn artifact_written_for_another_user_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        cache.store(&dataset()).unwrap();

        fs::rename(cache.user_dir("praveen"), cache.user_dir("asha")).unwrap();
        assert!(matches!(cache.load("asha"), Err(Error::CacheCorruption { .. })));
    }

    #[test]
    fn failed_store_leaves_no_lone_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DatasetCache::new(dir.path());
        // A directory in the way of the records temp file makes staging fail.
        fs::create_dir_all(staging_path(&cache.records_path("praveen"))).unwrap();

        assert!(cache.store(&dataset()).is_err());
        assert!(!cache.glucose_path("praveen").exists());
        assert!(!staging_path(&cache.glucose_path("praveen")).exists());
        assert!(cache.load("praveen").unwrap().is_none());
    }

    #[test]
    fn glucose_artifact_has_documented_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GLUCOSE_FILE);
        write_glucose(&path, &dataset().glucose).unwrap();

        let reader = FileReaderBuilder::new()
            .build(File::open(&path).unwrap())
            .unwrap();
        assert_eq!(reader.schema().as_ref(), &glucose_schema());
    }
}
