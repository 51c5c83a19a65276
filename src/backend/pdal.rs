//! Point loader backed by the PDAL command-line tool.
//!
//! The request is expressed as a PDAL pipeline and fed to
//! `pdal pipeline --stdin`:
//!
//! ```text
//! readers.las  (override_srs = EPSG:<epsg>)
//!   └─ filters.ferry  (Z=>elevation, Intensity=>intensity, …)
//!        └─ writers.ogr  (ESRI Shapefile, attr_dimensions = field names)
//! ```
//!
//! `filters.ferry` copies each LAS dimension into a new dimension named after
//! its vector field, so the shapefile columns match the [`FieldTable`] the
//! rasterizer is later asked to burn.

use super::command::run_tool;
use super::{PointLoader, VectorExportJob};
use crate::error::CollaboratorError;
use crate::fields::FieldTable;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Sidecar extensions written alongside a `.shp` file.
const SHAPEFILE_PARTS: &[&str] = &["shp", "shx", "dbf", "prj", "cpg"];

/// LAS dimension name for an attribute identifier.
pub fn las_dimension(attribute: &str) -> Option<&'static str> {
    Some(match attribute {
        "elevation" => "Z",
        "intensity" => "Intensity",
        "classification" => "Classification",
        "return_number" => "ReturnNumber",
        "number_of_returns" => "NumberOfReturns",
        "scan_angle" => "ScanAngleRank",
        "point_source_id" => "PointSourceId",
        "gps_time" => "GpsTime",
        "red" => "Red",
        "green" => "Green",
        "blue" => "Blue",
        _ => return None,
    })
}

/// Exports LAS/LAZ files to point shapefiles with `pdal`.
#[derive(Debug, Clone)]
pub struct PdalPointLoader {
    program: String,
    fields: FieldTable,
}

impl PdalPointLoader {
    pub fn new(fields: FieldTable) -> Self {
        Self {
            program: "pdal".to_string(),
            fields,
        }
    }

    /// Use a specific `pdal` executable instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Build the PDAL pipeline document for `job`.
    ///
    /// Attributes without a LAS dimension or without a field mapping are left
    /// out with a warning; the raster stage reports them per attribute.
    pub fn pipeline_json(&self, job: &VectorExportJob) -> Value {
        let mut ferries = Vec::new();
        let mut columns = Vec::new();

        for attribute in &job.attributes {
            let (Some(dimension), Some(field)) = (las_dimension(attribute), self.fields.field(attribute))
            else {
                warn!("Attribute '{}' cannot be exported by PDAL; skipping", attribute);
                continue;
            };
            ferries.push(format!("{dimension}=>{field}"));
            columns.push(field.to_string());
        }

        let mut stages = vec![json!({
            "type": "readers.las",
            "filename": job.source.to_string_lossy(),
            "override_srs": format!("EPSG:{}", job.epsg),
        })];

        if !ferries.is_empty() {
            stages.push(json!({
                "type": "filters.ferry",
                "dimensions": ferries.join(","),
            }));
        }

        stages.push(json!({
            "type": "writers.ogr",
            "filename": job.vector_path.to_string_lossy(),
            "ogrdriver": "ESRI Shapefile",
            "attr_dimensions": columns.join(","),
        }));

        json!({ "pipeline": stages })
    }
}

impl Default for PdalPointLoader {
    fn default() -> Self {
        Self::new(FieldTable::default())
    }
}

impl PointLoader for PdalPointLoader {
    fn export_to_vector(&self, job: &VectorExportJob) -> Result<(), CollaboratorError> {
        if job.vector_path.exists() {
            if !job.overwrite {
                info!(
                    "Keeping existing {} (overwrite disabled)",
                    job.vector_path.display()
                );
                return Ok(());
            }
            remove_shapefile(&job.vector_path)?;
        }

        let pipeline = self.pipeline_json(job);
        let body = serde_json::to_vec(&pipeline)
            .map_err(|e| CollaboratorError::Other(format!("failed to encode PDAL pipeline: {e}")))?;

        info!(
            "Exporting {} → {}",
            job.source.display(),
            job.vector_path.display()
        );
        let mut command = Command::new(&self.program);
        command.args(["pipeline", "--stdin"]);
        run_tool(&self.program, &mut command, Some(&body))?;
        debug!("pdal finished for {}", job.vector_path.display());
        Ok(())
    }
}

/// Delete a shapefile and its sidecar files. Missing parts are ignored.
fn remove_shapefile(path: &Path) -> Result<(), CollaboratorError> {
    for ext in SHAPEFILE_PARTS {
        let part = path.with_extension(ext);
        match std::fs::remove_file(&part) {
            Ok(()) => debug!("Removed {}", part.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CollaboratorError::Io { path: part, source }),
        }
    }
    Ok(())
}
