//! Stage A: make sure the vector artifact exists.

use crate::actions::ConversionObserver;
use crate::backend::{PointLoader, VectorExportJob};
use crate::config::Method;
use crate::error::ConvertError;
use crate::pipeline::resolve::ResolvedRequest;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// State of the vector artifact after stage A.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStatus {
    /// The artifact exists. `exported` is `true` if the point loader ran.
    Ready { exported: bool },
    /// The artifact is still absent; stage B must not run.
    Missing,
}

/// Whether a regular file exists at `path`.
pub async fn artifact_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Run the point loader if the export is requested or the artifact is
/// missing, then check that the artifact exists.
///
/// A point-loader error aborts the request and is returned as
/// [`ConvertError::PointLoader`].
pub async fn ensure_vector(
    loader: &Arc<dyn PointLoader>,
    request: &ResolvedRequest,
    observer: &dyn ConversionObserver,
) -> Result<VectorStatus, ConvertError> {
    let options = &request.options;
    let path = options.vector_path.as_path();

    let triggered = options.requests(Method::VectorExport) || !artifact_exists(path).await;

    if triggered {
        let job = VectorExportJob {
            source: request.source.clone(),
            epsg: request.epsg,
            attributes: options.extract_attributes.clone(),
            overwrite: options.overwrite,
            vector_path: options.vector_path.clone(),
        };
        observer.on_vector_export_start(&job);

        // Point loaders are blocking; keep them off the async workers.
        let loader = Arc::clone(loader);
        let result = tokio::task::spawn_blocking(move || loader.export_to_vector(&job))
            .await
            .map_err(|e| ConvertError::Internal(format!("point loader task failed: {e}")))?;

        if let Err(e) = result {
            observer.on_vector_export_error(path, &e.to_string());
            return Err(ConvertError::PointLoader(e));
        }
    }

    if !artifact_exists(path).await {
        warn!(
            " * {} does not exist; rasters will not be created",
            path.display()
        );
        observer.on_vector_missing(path);
        return Ok(VectorStatus::Missing);
    }

    info!(" * Using {} to create raster(s)", path.display());
    observer.on_vector_ready(path, triggered);
    Ok(VectorStatus::Ready {
        exported: triggered,
    })
}
