//! # las2geo
//!
//! Convert point-cloud files (LAS/LAZ) into a point vector file and, on
//! request, one raster grid per point attribute.
//!
//! The library does not read point clouds or compute rasters itself. It
//! decides which steps a request needs, runs them through a [`PointLoader`]
//! and a [`Rasterizer`], detects a missing intermediate product, and
//! remembers the outcome so an identical request is answered without any
//! work.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source.las
//!  │
//!  ├─ 1. Resolve  fill unset options from defaults (stem-based paths)
//!  ├─ 2. Cache    identical resolved request seen before? return its outcome
//!  ├─ 3. Vector   export points → <stem>.shp if requested or missing
//!  ├─ 4. Check    vector file absent → Outcome::Failure, stop here
//!  └─ 5. Raster   one GeoTIFF per attribute (+ optional DEM), independent jobs
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use las2geo::{Converter, ConvertRequest, RawOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // PDAL + GDAL backends, outputs next to the working directory.
//!     let converter = Converter::builder().build()?;
//!     let request = ConvertRequest::new(
//!         "plot1.las",
//!         32632,
//!         RawOptions::new()
//!             .methods(["vector-export", "raster-export"])
//!             .extract_attributes(["elevation", "intensity"]),
//!     );
//!     let outcome = converter.process(&request).await?;
//!     if let Some(report) = outcome.report() {
//!         for raster in &report.rasters {
//!             eprintln!("{}: {:?}", raster.path.display(), raster.error);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `las2geo` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! las2geo = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! The default backends shell out to `pdal` and `gdal_rasterize`. Any other
//! toolchain can be plugged in through the [`PointLoader`] and [`Rasterizer`]
//! traits.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod actions;
pub mod backend;
pub mod config;
pub mod convert;
pub mod epsg;
pub mod error;
pub mod fields;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use actions::{
    Action, ActionLogger, ActionRecord, ActionStatus, ConversionObserver, NoopObserver,
    ObserverSet,
};
pub use backend::{PointLoader, RasterJob, Rasterizer, VectorExportJob};
pub use config::{ConversionOptions, Method, PipelineConfig, RawOptions};
pub use convert::{default_converter, process_file, process_file_sync, Converter, ConverterBuilder};
pub use epsg::{epsg_search_url, lookup_epsg};
pub use error::{CollaboratorError, ConvertError, RasterError, ResolutionError};
pub use fields::FieldTable;
pub use output::{
    ConversionReport, ConversionStats, FailureReason, Outcome, RasterKind, RasterResult,
};
pub use pipeline::cache::{CacheKey, CachedOutcome, ConversionCache};
pub use pipeline::orchestrate::ConversionPipeline;
pub use pipeline::resolve::{ConvertRequest, OptionResolver, ResolvedRequest};
