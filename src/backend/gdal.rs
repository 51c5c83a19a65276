//! Rasterizer backed by `gdal_rasterize`.

use super::command::run_tool;
use super::{RasterJob, Rasterizer};
use crate::error::CollaboratorError;
use std::process::Command;
use tracing::{debug, info};

/// NoData value written to cells without points.
pub const NODATA: &str = "-9999";

/// Burns shapefile fields into GeoTIFFs with `gdal_rasterize`.
#[derive(Debug, Clone)]
pub struct GdalRasterizer {
    program: String,
}

impl GdalRasterizer {
    pub fn new() -> Self {
        Self {
            program: "gdal_rasterize".to_string(),
        }
    }

    /// Use a specific `gdal_rasterize` executable instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Command-line arguments for `job`.
    ///
    /// The OGR layer of a shapefile is named after its file stem.
    pub fn args(job: &RasterJob) -> Vec<String> {
        let layer = job
            .vector_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let px = job.pixel_size.to_string();

        vec![
            "-a".into(),
            job.field.clone(),
            "-tr".into(),
            px.clone(),
            px,
            "-a_nodata".into(),
            NODATA.into(),
            "-ot".into(),
            "Float32".into(),
            "-of".into(),
            "GTiff".into(),
            "-l".into(),
            layer,
            job.vector_path.to_string_lossy().into_owned(),
            job.raster_path.to_string_lossy().into_owned(),
        ]
    }
}

impl Default for GdalRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for GdalRasterizer {
    fn rasterize(&self, job: &RasterJob) -> Result<(), CollaboratorError> {
        if job.raster_path.exists() {
            if !job.overwrite {
                info!(
                    "Keeping existing {} (overwrite disabled)",
                    job.raster_path.display()
                );
                return Ok(());
            }
            // gdal_rasterize would burn into the existing grid instead of replacing it.
            std::fs::remove_file(&job.raster_path).map_err(|source| CollaboratorError::Io {
                path: job.raster_path.clone(),
                source,
            })?;
        }

        if let Some(parent) = job.raster_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CollaboratorError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut command = Command::new(&self.program);
        command.args(Self::args(job));
        run_tool(&self.program, &mut command, None)?;
        debug!(
            "Rasterised field '{}' → {}",
            job.field,
            job.raster_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job() -> RasterJob {
        RasterJob {
            vector_path: PathBuf::from("/out/plot1.shp"),
            raster_path: PathBuf::from("/out/plot1_plot1_elevation.tif"),
            pixel_size: 0.5,
            field: "elevation".into(),
            overwrite: true,
        }
    }

    #[test]
    fn args_burn_field_at_pixel_size() {
        let args = GdalRasterizer::args(&job());
        assert_eq!(&args[..2], &["-a", "elevation"]);
        assert_eq!(&args[2..5], &["-tr", "0.5", "0.5"]);
        let layer = args.iter().position(|a| a == "-l").unwrap();
        assert_eq!(args[layer + 1], "plot1");
        assert_eq!(args[args.len() - 2], "/out/plot1.shp");
        assert_eq!(args[args.len() - 1], "/out/plot1_plot1_elevation.tif");
    }

    #[test]
    fn non_positive_pixel_size_is_forwarded() {
        let mut j = job();
        j.pixel_size = -1.0;
        let args = GdalRasterizer::args(&j);
        assert_eq!(&args[2..5], &["-tr", "-1", "-1"]);
    }

    #[test]
    fn existing_raster_is_kept_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("a.tif");
        std::fs::write(&tif, b"grid").unwrap();

        let mut j = job();
        j.raster_path = tif.clone();
        j.overwrite = false;

        let r = GdalRasterizer::new().with_program("las2geo-no-such-gdal");
        r.rasterize(&j).unwrap();
        assert_eq!(std::fs::read(&tif).unwrap(), b"grid");
    }

    #[test]
    fn missing_program_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut j = job();
        j.raster_path = dir.path().join("a.tif");

        let r = GdalRasterizer::new().with_program("las2geo-no-such-gdal");
        let err = r.rasterize(&j).unwrap_err();
        assert!(matches!(err, CollaboratorError::ToolUnavailable { .. }));
    }
}
