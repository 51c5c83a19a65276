//! Stage B: burn one raster per requested attribute.
//!
//! Jobs are independent. A failing attribute is recorded in its
//! [`RasterResult`] and the remaining jobs still run. Results come back in
//! plan order (attributes first, DEM last) whatever order the jobs finish in.

use crate::actions::ConversionObserver;
use crate::backend::{RasterJob, Rasterizer};
use crate::config::{ConversionOptions, Method, DEFAULT_ATTRIBUTE, RASTER_EXTENSION};
use crate::error::RasterError;
use crate::fields::FieldTable;
use crate::output::{RasterKind, RasterResult};
use crate::pipeline::vector::artifact_exists;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Suffix of the DEM raster, in place of a field name.
const DEM_SUFFIX: &str = "dem";

/// One raster the stage will attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRaster {
    pub attribute: String,
    /// `None` when the attribute has no vector field.
    pub field: Option<String>,
    pub path: PathBuf,
    pub kind: RasterKind,
}

/// `<prefix><vector stem>_<suffix>.tif`
pub fn raster_path(prefix: &str, vector_path: &Path, suffix: &str) -> PathBuf {
    let stem = vector_path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    PathBuf::from(format!("{prefix}{stem}_{suffix}.{RASTER_EXTENSION}"))
}

/// The raster jobs implied by `options`, in execution order.
///
/// Empty unless raster export is requested. With `create_dem` the DEM job
/// follows the attribute rasters.
pub fn plan_rasters(options: &ConversionOptions, fields: &FieldTable) -> Vec<PlannedRaster> {
    if !options.requests(Method::RasterExport) {
        return Vec::new();
    }

    let mut plan: Vec<PlannedRaster> = options
        .extract_attributes
        .iter()
        .map(|attribute| {
            let field = fields.field(attribute).map(str::to_string);
            let suffix = field.as_deref().unwrap_or(attribute);
            PlannedRaster {
                attribute: attribute.clone(),
                path: raster_path(&options.raster_prefix, &options.vector_path, suffix),
                field,
                kind: RasterKind::Attribute,
            }
        })
        .collect();

    if options.create_dem {
        plan.push(PlannedRaster {
            attribute: DEFAULT_ATTRIBUTE.to_string(),
            field: fields.field(DEFAULT_ATTRIBUTE).map(str::to_string),
            path: raster_path(&options.raster_prefix, &options.vector_path, DEM_SUFFIX),
            kind: RasterKind::Dem,
        });
    }

    plan
}

/// Run every planned job with at most `concurrency` in flight.
pub async fn export_rasters(
    rasterizer: &Arc<dyn Rasterizer>,
    options: &ConversionOptions,
    plan: Vec<PlannedRaster>,
    concurrency: usize,
    observer: &dyn ConversionObserver,
) -> Vec<RasterResult> {
    observer.on_raster_stage_start(plan.len());

    let mut results: Vec<(usize, RasterResult)> =
        stream::iter(plan.into_iter().enumerate().map(|(idx, planned)| {
            let rasterizer = Arc::clone(rasterizer);
            async move { (idx, rasterize_one(rasterizer, options, planned, observer).await) }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, r)| r).collect()
}

async fn rasterize_one(
    rasterizer: Arc<dyn Rasterizer>,
    options: &ConversionOptions,
    planned: PlannedRaster,
    observer: &dyn ConversionObserver,
) -> RasterResult {
    let start = Instant::now();
    let PlannedRaster {
        attribute,
        field,
        path,
        kind,
    } = planned;

    let mut result = RasterResult {
        attribute: attribute.clone(),
        field: field.clone(),
        path: path.clone(),
        kind,
        error: None,
        duration_ms: 0,
    };

    let Some(field) = field else {
        let error = RasterError::UnknownAttribute { attribute };
        observer.on_raster_error(&result, &error);
        result.error = Some(error);
        return result;
    };

    observer.on_raster_start(&attribute, &path);

    let job = RasterJob {
        vector_path: options.vector_path.clone(),
        raster_path: path.clone(),
        pixel_size: options.pixel_size,
        field,
        overwrite: options.overwrite,
    };

    let outcome = tokio::task::spawn_blocking(move || rasterizer.rasterize(&job)).await;

    let error = match outcome {
        Ok(Ok(())) => {
            if artifact_exists(&path).await {
                None
            } else {
                Some(RasterError::NotProduced {
                    attribute: attribute.clone(),
                    path: path.clone(),
                })
            }
        }
        Ok(Err(e)) => Some(RasterError::Rasterizer {
            attribute: attribute.clone(),
            detail: e.to_string(),
        }),
        Err(e) => Some(RasterError::Rasterizer {
            attribute: attribute.clone(),
            detail: format!("rasterizer task failed: {e}"),
        }),
    };

    result.duration_ms = start.elapsed().as_millis() as u64;
    match error {
        None => observer.on_raster_complete(&result),
        Some(error) => {
            observer.on_raster_error(&result, &error);
            result.error = Some(error);
        }
    }
    result
}
