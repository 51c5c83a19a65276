//! Observer trait for conversion events, and the [`ActionLogger`] that
//! records them.
//!
//! The [`crate::convert::Converter`] reports every decision it takes to one
//! [`ConversionObserver`]: the cache hit/miss decision first, then each
//! pipeline stage transition, then the final outcome. Observers only watch;
//! they cannot change the result of a conversion.
//!
//! # Thread safety
//!
//! With `raster_concurrency > 1`, the raster callbacks may be invoked
//! concurrently. Implementations must guard shared mutable state.

use crate::backend::VectorExportJob;
use crate::error::RasterError;
use crate::output::{Outcome, RasterResult};
use crate::pipeline::cache::CacheKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Called by the converter as a request moves through cache and pipeline.
///
/// All methods default to no-ops so implementations override only what they
/// need.
pub trait ConversionObserver: Send + Sync {
    /// A request passed resolution and is about to be looked up.
    fn on_conversion_start(&self, source: &Path, epsg: u32) {
        let _ = (source, epsg);
    }

    /// The cache decided whether the pipeline runs.
    ///
    /// On a miss this fires before any stage callback.
    fn on_cache_lookup(&self, key: &CacheKey, hit: bool) {
        let _ = (key, hit);
    }

    /// Stage A is about to call the point loader.
    fn on_vector_export_start(&self, job: &VectorExportJob) {
        let _ = job;
    }

    /// The point loader returned an error; the request aborts.
    fn on_vector_export_error(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// The vector artifact exists after stage A.
    ///
    /// `exported` is `false` when an existing file was reused.
    fn on_vector_ready(&self, path: &Path, exported: bool) {
        let _ = (path, exported);
    }

    /// The vector artifact is absent after stage A; stage B is skipped.
    fn on_vector_missing(&self, path: &Path) {
        let _ = path;
    }

    /// Stage B starts with `total` raster jobs.
    fn on_raster_stage_start(&self, total: usize) {
        let _ = total;
    }

    /// A raster job is about to call the rasterizer.
    fn on_raster_start(&self, attribute: &str, path: &Path) {
        let _ = (attribute, path);
    }

    /// A raster job finished without error.
    fn on_raster_complete(&self, result: &RasterResult) {
        let _ = result;
    }

    /// A raster job failed; the remaining jobs still run.
    fn on_raster_error(&self, result: &RasterResult, error: &RasterError) {
        let _ = (result, error);
    }

    /// The request finished, from the pipeline or from the cache.
    fn on_conversion_complete(&self, source: &Path, epsg: u32, outcome: &Outcome, from_cache: bool) {
        let _ = (source, epsg, outcome, from_cache);
    }
}

/// An observer that ignores every event.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

/// Fans each event out to several observers, in order.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn ConversionObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl ConversionObserver for ObserverSet {
    fn on_conversion_start(&self, source: &Path, epsg: u32) {
        self.observers.iter().for_each(|o| o.on_conversion_start(source, epsg));
    }
    fn on_cache_lookup(&self, key: &CacheKey, hit: bool) {
        self.observers.iter().for_each(|o| o.on_cache_lookup(key, hit));
    }
    fn on_vector_export_start(&self, job: &VectorExportJob) {
        self.observers.iter().for_each(|o| o.on_vector_export_start(job));
    }
    fn on_vector_export_error(&self, path: &Path, error: &str) {
        self.observers.iter().for_each(|o| o.on_vector_export_error(path, error));
    }
    fn on_vector_ready(&self, path: &Path, exported: bool) {
        self.observers.iter().for_each(|o| o.on_vector_ready(path, exported));
    }
    fn on_vector_missing(&self, path: &Path) {
        self.observers.iter().for_each(|o| o.on_vector_missing(path));
    }
    fn on_raster_stage_start(&self, total: usize) {
        self.observers.iter().for_each(|o| o.on_raster_stage_start(total));
    }
    fn on_raster_start(&self, attribute: &str, path: &Path) {
        self.observers.iter().for_each(|o| o.on_raster_start(attribute, path));
    }
    fn on_raster_complete(&self, result: &RasterResult) {
        self.observers.iter().for_each(|o| o.on_raster_complete(result));
    }
    fn on_raster_error(&self, result: &RasterResult, error: &RasterError) {
        self.observers.iter().for_each(|o| o.on_raster_error(result, error));
    }
    fn on_conversion_complete(&self, source: &Path, epsg: u32, outcome: &Outcome, from_cache: bool) {
        self.observers
            .iter()
            .for_each(|o| o.on_conversion_complete(source, epsg, outcome, from_cache));
    }
}

// ── Action records ───────────────────────────────────────────────────────

/// Something the converter tried to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// The whole request.
    Convert { source: PathBuf, epsg: u32 },
    /// The memoization decision for a cache key digest.
    CacheLookup { key: String, hit: bool },
    /// Running the point loader.
    VectorExport { path: PathBuf },
    /// Reusing an existing vector artifact without exporting.
    VectorReuse { path: PathBuf },
    /// Burning one raster.
    Rasterize { attribute: String, path: PathBuf },
}

/// How far an [`Action`] got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ActionStatus {
    Attempted,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: Action,
    pub status: ActionStatus,
}

/// Logs every conversion event through `tracing` and keeps an in-memory
/// record of attempted, succeeded and failed actions.
///
/// Recording never fails a conversion: if the record lock is poisoned the
/// event is still logged but not stored.
#[derive(Default)]
pub struct ActionLogger {
    records: Mutex<Vec<ActionRecord>>,
}

impl ActionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in event order.
    pub fn records(&self) -> Vec<ActionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    fn record(&self, action: Action, status: ActionStatus) {
        if let Ok(mut records) = self.records.lock() {
            records.push(ActionRecord { action, status });
        }
    }
}

impl ConversionObserver for ActionLogger {
    fn on_conversion_start(&self, source: &Path, epsg: u32) {
        debug!(source = %source.display(), epsg, "conversion attempted");
        self.record(
            Action::Convert {
                source: source.to_path_buf(),
                epsg,
            },
            ActionStatus::Attempted,
        );
    }

    fn on_cache_lookup(&self, key: &CacheKey, hit: bool) {
        if hit {
            info!(key = key.digest(), "cache hit: reusing previous outcome");
        } else {
            debug!(key = key.digest(), "cache miss: running pipeline");
        }
        self.record(
            Action::CacheLookup {
                key: key.digest().to_string(),
                hit,
            },
            ActionStatus::Succeeded,
        );
    }

    fn on_vector_export_start(&self, job: &VectorExportJob) {
        debug!(path = %job.vector_path.display(), "vector export attempted");
        self.record(
            Action::VectorExport {
                path: job.vector_path.clone(),
            },
            ActionStatus::Attempted,
        );
    }

    fn on_vector_export_error(&self, path: &Path, error: &str) {
        warn!(path = %path.display(), "vector export failed: {}", error);
        self.record(
            Action::VectorExport {
                path: path.to_path_buf(),
            },
            ActionStatus::Failed(error.to_string()),
        );
    }

    fn on_vector_ready(&self, path: &Path, exported: bool) {
        let path = path.to_path_buf();
        if exported {
            debug!(path = %path.display(), "vector export succeeded");
            self.record(Action::VectorExport { path }, ActionStatus::Succeeded);
        } else {
            debug!(path = %path.display(), "reusing existing vector artifact");
            self.record(Action::VectorReuse { path }, ActionStatus::Succeeded);
        }
    }

    fn on_vector_missing(&self, path: &Path) {
        debug!(path = %path.display(), "vector stage failed");
        self.record(
            Action::VectorExport {
                path: path.to_path_buf(),
            },
            ActionStatus::Failed("vector artifact missing".into()),
        );
    }

    fn on_raster_stage_start(&self, total: usize) {
        debug!(total, "raster stage started");
    }

    fn on_raster_start(&self, attribute: &str, path: &Path) {
        debug!(attribute, path = %path.display(), "rasterize attempted");
        self.record(
            Action::Rasterize {
                attribute: attribute.to_string(),
                path: path.to_path_buf(),
            },
            ActionStatus::Attempted,
        );
    }

    fn on_raster_complete(&self, result: &RasterResult) {
        debug!(attribute = %result.attribute, path = %result.path.display(), "rasterize succeeded");
        self.record(
            Action::Rasterize {
                attribute: result.attribute.clone(),
                path: result.path.clone(),
            },
            ActionStatus::Succeeded,
        );
    }

    fn on_raster_error(&self, result: &RasterResult, error: &RasterError) {
        warn!("{}", error);
        self.record(
            Action::Rasterize {
                attribute: result.attribute.clone(),
                path: result.path.clone(),
            },
            ActionStatus::Failed(error.to_string()),
        );
    }

    fn on_conversion_complete(&self, source: &Path, epsg: u32, outcome: &Outcome, from_cache: bool) {
        let status = match outcome {
            Outcome::Success(_) => ActionStatus::Succeeded,
            Outcome::Failure(reason) => ActionStatus::Failed(reason.to_string()),
        };
        info!(
            source = %source.display(),
            from_cache,
            success = outcome.is_success(),
            "conversion finished"
        );
        self.record(
            Action::Convert {
                source: source.to_path_buf(),
                epsg,
            },
            status,
        );
    }
}
