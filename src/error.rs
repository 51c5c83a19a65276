//! Error types for the las2geo library.
//!
//! Three layers of failure are kept apart:
//!
//! * [`ConvertError`] is **fatal**: the request cannot be processed at all
//!   (malformed options, the point loader blew up). Returned as
//!   `Err(ConvertError)` from the `process*` entry points.
//!
//! * [`crate::output::FailureReason`] is an **expected failure**: the pipeline ran
//!   but the vector artifact never appeared. Reported as
//!   `Ok(Outcome::Failure(..))`, which `process_file` maps to `false`.
//!
//! * [`RasterError`] is **non-fatal**: a single attribute's raster failed while
//!   the others are fine. Stored inside [`crate::output::RasterResult`] so
//!   callers can tell "fully succeeded" from "vector ok, some rasters failed".

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the las2geo library.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The request or its options are structurally invalid.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The point loader failed while producing the vector artifact.
    ///
    /// Propagated unmodified; the outcome is not cached, so an identical
    /// request will run the pipeline again.
    #[error("Point loader failed: {0}")]
    PointLoader(#[source] CollaboratorError),

    /// Some rasters failed although the vector artifact was produced.
    ///
    /// Returned by [`crate::output::ConversionReport::into_result`] when the
    /// caller wants to treat any raster failure as an error.
    #[error("{failed}/{total} rasters failed during conversion")]
    PartialFailure { failed: usize, total: usize },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed or missing input detected before any work is done.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The source file name is empty.
    #[error("Source file name is empty")]
    EmptySourceName,

    /// The source path has no file name to derive output names from.
    #[error("Cannot derive an output name from '{path}': it has no file stem")]
    NoFileStem { path: PathBuf },

    /// EPSG codes are positive integers.
    #[error("Invalid EPSG code {epsg}: must be a positive integer\nTry: las2geo lookup <file>")]
    InvalidEpsg { epsg: u32 },

    /// A method name that is neither a canonical nor a legacy stage name.
    #[error("Unknown method '{method}'. Valid methods: vector-export, raster-export (legacy: las2shp, las2tif, shp2tif)")]
    UnknownMethod { method: String },

    /// `vector_path` was supplied but empty.
    #[error("vector_path must not be empty")]
    EmptyVectorPath,

    /// Options could not be parsed or violate a constraint.
    #[error("Invalid options: {reason}")]
    InvalidOptions { reason: String },
}

/// A non-fatal error for a single raster attribute.
///
/// The overall conversion still reports success; see
/// [`crate::output::ConversionReport::is_complete`].
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum RasterError {
    /// The rasterizer reported an error.
    #[error("Raster '{attribute}': rasterizer failed: {detail}")]
    Rasterizer { attribute: String, detail: String },

    /// The rasterizer returned success but no file exists at the output path.
    #[error("Raster '{attribute}': no file produced at '{path}'")]
    NotProduced { attribute: String, path: PathBuf },

    /// The attribute has no entry in the field table.
    #[error("Raster '{attribute}': attribute has no vector field mapping")]
    UnknownAttribute { attribute: String },
}

/// Errors reported by the point loader and rasterizer backends.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The external program could not be started.
    #[error("'{tool}' is not available: {source}\nInstall it and make sure it is on PATH.")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The external program ran and exited unsuccessfully.
    #[error("'{tool}' exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// File-system error while preparing or cleaning up outputs.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = ConvertError::PartialFailure {
            failed: 1,
            total: 3,
        };
        assert!(e.to_string().contains("1/3"), "got: {e}");
    }

    #[test]
    fn resolution_error_is_transparent() {
        let e: ConvertError = ResolutionError::InvalidEpsg { epsg: 0 }.into();
        assert!(e.to_string().starts_with("Invalid EPSG code 0"));
    }

    #[test]
    fn unknown_method_lists_valid_names() {
        let e = ResolutionError::UnknownMethod {
            method: "las2png".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("las2png"));
        assert!(msg.contains("raster-export"));
    }

    #[test]
    fn tool_failed_display() {
        let e = CollaboratorError::ToolFailed {
            tool: "gdal_rasterize".into(),
            status: "exit status: 1".into(),
            stderr: "field not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("gdal_rasterize"));
        assert!(msg.contains("field not found"));
    }

    #[test]
    fn raster_error_display_names_attribute() {
        let e = RasterError::NotProduced {
            attribute: "intensity".into(),
            path: PathBuf::from("/tmp/plot1_plot1_intensity.tif"),
        };
        assert!(e.to_string().contains("intensity"));
        assert!(e.to_string().contains("plot1_intensity.tif"));
    }
}
