//! The conversion pipeline: stage A, then (if the vector exists) stage B.

use crate::actions::ConversionObserver;
use crate::backend::{PointLoader, Rasterizer};
use crate::config::PipelineConfig;
use crate::error::ConvertError;
use crate::fields::FieldTable;
use crate::output::{ConversionReport, ConversionStats, FailureReason, Outcome};
use crate::pipeline::raster::{export_rasters, plan_rasters};
use crate::pipeline::resolve::ResolvedRequest;
use crate::pipeline::vector::{ensure_vector, VectorStatus};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs one resolved request against the collaborators.
///
/// The pipeline holds no per-request state and does not memoize; see
/// [`crate::pipeline::cache::ConversionCache`].
#[derive(Clone)]
pub struct ConversionPipeline {
    loader: Arc<dyn PointLoader>,
    rasterizer: Arc<dyn Rasterizer>,
    fields: FieldTable,
    config: PipelineConfig,
}

impl ConversionPipeline {
    pub fn new(loader: Arc<dyn PointLoader>, rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self {
            loader,
            rasterizer,
            fields: FieldTable::default(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_field_table(mut self, fields: FieldTable) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Produce the vector artifact and the requested rasters.
    ///
    /// Returns `Outcome::Failure` when the vector artifact is missing after
    /// stage A. Raster failures never turn a success into a failure; they are
    /// listed in the report.
    pub async fn run(
        &self,
        request: &ResolvedRequest,
        observer: &dyn ConversionObserver,
    ) -> Result<Outcome, ConvertError> {
        let total_start = Instant::now();
        let options = &request.options;

        // ── Stage A: vector ──────────────────────────────────────────────
        let vector_start = Instant::now();
        let status = ensure_vector(&self.loader, request, observer).await?;
        let vector_duration_ms = vector_start.elapsed().as_millis() as u64;

        let exported = match status {
            VectorStatus::Ready { exported } => exported,
            VectorStatus::Missing => {
                return Ok(Outcome::Failure(FailureReason::VectorArtifactMissing {
                    path: options.vector_path.clone(),
                }));
            }
        };

        // ── Stage B: rasters ─────────────────────────────────────────────
        let plan = plan_rasters(options, &self.fields);
        debug!("{} raster job(s) planned", plan.len());

        let raster_start = Instant::now();
        let rasters = if plan.is_empty() {
            Vec::new()
        } else {
            export_rasters(
                &self.rasterizer,
                options,
                plan,
                self.config.raster_concurrency,
                observer,
            )
            .await
        };
        let raster_duration_ms = raster_start.elapsed().as_millis() as u64;

        let rasters_failed = rasters.iter().filter(|r| !r.is_ok()).count();
        let stats = ConversionStats {
            rasters_written: rasters.len() - rasters_failed,
            rasters_failed,
            vector_duration_ms,
            raster_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Converted {} → {} ({} raster(s), {} failed) in {}ms",
            request.source.display(),
            options.vector_path.display(),
            stats.rasters_written,
            stats.rasters_failed,
            stats.total_duration_ms
        );

        Ok(Outcome::Success(ConversionReport {
            source: request.source.clone(),
            epsg: request.epsg,
            vector_path: options.vector_path.clone(),
            vector_exported: exported,
            rasters,
            stats,
        }))
    }
}
