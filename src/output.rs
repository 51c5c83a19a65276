//! Outcome types produced by a conversion.
//!
//! A request resolves to one [`Outcome`]. Identical requests share the same
//! outcome for the lifetime of the cache that produced it.

use crate::error::{ConvertError, RasterError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The result of running (or recalling) a conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The vector artifact exists; rasters (if any) are reported per attribute.
    Success(ConversionReport),
    /// The pipeline stopped before the raster stage.
    Failure(FailureReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn report(&self) -> Option<&ConversionReport> {
        match self {
            Outcome::Success(report) => Some(report),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(reason) => Some(reason),
        }
    }
}

/// Why a conversion reported failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum FailureReason {
    /// The vector artifact does not exist after the export stage.
    #[error("vector artifact missing: '{path}'")]
    VectorArtifactMissing { path: PathBuf },
}

/// What a successful conversion produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    /// Source point-cloud file.
    pub source: PathBuf,
    /// EPSG code the source was interpreted in.
    pub epsg: u32,
    /// Vector artifact used for rasterisation.
    pub vector_path: PathBuf,
    /// `true` when the point loader was invoked in this run, `false` when an
    /// existing vector file was reused.
    pub vector_exported: bool,
    /// One entry per raster job, in attribute order (DEM last).
    pub rasters: Vec<RasterResult>,
    pub stats: ConversionStats,
}

impl ConversionReport {
    /// `true` if every raster job succeeded (vacuously so with no rasters).
    pub fn is_complete(&self) -> bool {
        self.rasters.iter().all(RasterResult::is_ok)
    }

    pub fn failed_rasters(&self) -> impl Iterator<Item = &RasterResult> {
        self.rasters.iter().filter(|r| !r.is_ok())
    }

    /// Turn partial raster failure into an error.
    pub fn into_result(self) -> Result<Self, ConvertError> {
        let failed = self.failed_rasters().count();
        if failed > 0 {
            return Err(ConvertError::PartialFailure {
                failed,
                total: self.rasters.len(),
            });
        }
        Ok(self)
    }
}

/// Which surface a raster job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterKind {
    /// One of the requested `extract_attributes`.
    Attribute,
    /// The bare elevation surface requested with `create_dem`.
    Dem,
}

/// Result of a single raster job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterResult {
    /// Attribute identifier the job was derived from.
    pub attribute: String,
    /// Vector field burnt into the grid (`None` when the attribute is unmapped).
    pub field: Option<String>,
    /// Output raster path.
    pub path: PathBuf,
    pub kind: RasterKind,
    /// Set when this job failed; the conversion as a whole still succeeds.
    pub error: Option<RasterError>,
    pub duration_ms: u64,
}

impl RasterResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Timing and counts for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub rasters_written: usize,
    pub rasters_failed: usize,
    pub vector_duration_ms: u64,
    pub raster_duration_ms: u64,
    pub total_duration_ms: u64,
}
