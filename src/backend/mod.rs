//! External collaborators: the point loader and the rasterizer.
//!
//! The orchestration core only knows these two traits. Implementations are
//! plain blocking calls; the pipeline runs them on tokio's blocking pool.
//!
//! ```text
//! PointLoader  : source.las ──▶ points.shp      (one call per request)
//! Rasterizer   : points.shp ──▶ <field>.tif     (one call per attribute)
//! ```
//!
//! Two implementations ship with the crate, both thin shell-outs:
//!
//! * [`pdal::PdalPointLoader`]: `pdal pipeline --stdin`
//! * [`gdal::GdalRasterizer`]: `gdal_rasterize`

pub mod command;
pub mod gdal;
pub mod pdal;

use crate::error::CollaboratorError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything the point loader needs to produce the vector artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorExportJob {
    /// Point-cloud source file.
    pub source: PathBuf,
    /// CRS the source coordinates are in.
    pub epsg: u32,
    /// Attributes to carry over as vector fields, in order.
    pub attributes: Vec<String>,
    /// Replace an existing vector file.
    pub overwrite: bool,
    /// Where to write the vector artifact.
    pub vector_path: PathBuf,
}

/// One raster to burn from the vector artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterJob {
    pub vector_path: PathBuf,
    pub raster_path: PathBuf,
    /// Cell size in CRS units; not validated by the core.
    pub pixel_size: f64,
    /// Vector field whose values are burnt into the grid.
    pub field: String,
    pub overwrite: bool,
}

/// Converts a point-cloud file into a point vector file.
///
/// Returning `Ok(())` does not prove a file was written; the pipeline checks
/// for the vector artifact afterwards. An `Err` aborts the request and is
/// propagated to the caller.
pub trait PointLoader: Send + Sync {
    fn export_to_vector(&self, job: &VectorExportJob) -> Result<(), CollaboratorError>;
}

/// Burns one vector field into a raster grid.
///
/// An `Err` is recorded against the attribute; other attributes still run.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, job: &RasterJob) -> Result<(), CollaboratorError>;
}
