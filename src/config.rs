//! Configuration types for point-cloud conversion.
//!
//! A request carries [`RawOptions`]: every recognised key is an `Option`, and
//! `None` means "not supplied". The resolver
//! ([`crate::pipeline::resolve::OptionResolver`]) turns them into a
//! [`ConversionOptions`] where every field has a value.
//!
//! # Presence, not truthiness
//! A caller-supplied `false`, `0.0` or empty list is kept as given. Only keys
//! that were never supplied fall back to defaults.

use crate::error::ResolutionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Attribute extracted when the caller does not ask for any.
pub const DEFAULT_ATTRIBUTE: &str = "elevation";

/// Extension of the vector artifact (ESRI Shapefile).
pub const VECTOR_EXTENSION: &str = "shp";

/// Extension of raster artifacts (GeoTIFF).
pub const RASTER_EXTENSION: &str = "tif";

/// Default raster cell size in source CRS units.
pub const DEFAULT_PIXEL_SIZE: f64 = 1.0;

// ── Methods ──────────────────────────────────────────────────────────────

/// A pipeline stage the caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Produce (or re-produce) the point vector file.
    VectorExport,
    /// Produce one raster per requested attribute from the vector file.
    RasterExport,
}

impl Method {
    /// Parse a method name.
    ///
    /// Accepts the canonical names (`vector-export`, `raster-export`) and the
    /// legacy stage names `las2shp`, `las2tif` and `shp2tif`. Both legacy
    /// `*2tif` names request raster export only; the vector file is then
    /// produced only if it does not exist yet.
    pub fn parse(name: &str) -> Result<Self, ResolutionError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vector-export" | "vector_export" | "las2shp" => Ok(Method::VectorExport),
            "raster-export" | "raster_export" | "las2tif" | "shp2tif" => Ok(Method::RasterExport),
            _ => Err(ResolutionError::UnknownMethod {
                method: name.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::VectorExport => "vector-export",
            Method::RasterExport => "raster-export",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw options ──────────────────────────────────────────────────────────

/// Caller-supplied, partially specified overrides.
///
/// Deserialises from any serde mapping. Unrecognised keys are ignored, and
/// the legacy keys `shapefile_name` and `tif_prefix` are accepted as aliases.
///
/// # Example
/// ```rust
/// use las2geo::RawOptions;
///
/// let opts = RawOptions::new()
///     .methods(["vector-export", "raster-export"])
///     .extract_attributes(["elevation", "intensity"])
///     .pixel_size(0.5);
/// assert_eq!(opts.pixel_size, Some(0.5));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    /// Attributes to extract (ordered, duplicates collapse to the first).
    pub extract_attributes: Option<Vec<String>>,

    /// Requested stages by name; see [`Method::parse`].
    pub methods: Option<Vec<String>>,

    /// Output path of the vector artifact.
    #[serde(alias = "shapefile_name")]
    pub vector_path: Option<PathBuf>,

    /// Path prefix (including folder) for raster outputs.
    #[serde(alias = "tif_prefix")]
    pub raster_prefix: Option<String>,

    /// Whether existing artifacts may be replaced.
    pub overwrite: Option<bool>,

    /// Additionally produce a bare elevation surface.
    pub create_dem: Option<bool>,

    /// Raster cell size in source CRS units.
    pub pixel_size: Option<f64>,
}

impl RawOptions {
    /// Empty options: every key falls back to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object. Unknown keys are ignored.
    pub fn from_json_str(json: &str) -> Result<Self, ResolutionError> {
        serde_json::from_str(json).map_err(|e| ResolutionError::InvalidOptions {
            reason: e.to_string(),
        })
    }

    /// Build options from an already-parsed key/value mapping.
    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self, ResolutionError> {
        serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| {
            ResolutionError::InvalidOptions {
                reason: e.to_string(),
            }
        })
    }

    pub fn extract_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extract_attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = Some(methods.into_iter().map(Into::into).collect());
        self
    }

    pub fn vector_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vector_path = Some(path.into());
        self
    }

    pub fn raster_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.raster_prefix = Some(prefix.into());
        self
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.overwrite = Some(v);
        self
    }

    pub fn create_dem(mut self, v: bool) -> Self {
        self.create_dem = Some(v);
        self
    }

    pub fn pixel_size(mut self, size: f64) -> Self {
        self.pixel_size = Some(size);
        self
    }
}

// ── Resolved options ─────────────────────────────────────────────────────

/// Fully resolved conversion options. Every field has a value.
///
/// Built only by the resolver; a new request produces a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Attributes to derive, in order, without duplicates. Default: `["elevation"]`.
    pub extract_attributes: Vec<String>,

    /// Requested stages. Default: `{vector-export}`.
    pub methods: BTreeSet<Method>,

    /// Vector artifact path. Default: `<base_dir>/<stem>.shp`.
    pub vector_path: PathBuf,

    /// Raster path prefix. Default: `<base_dir>/<stem>_`.
    pub raster_prefix: String,

    /// Replace existing artifacts. Default: `true`.
    pub overwrite: bool,

    /// Additionally produce a DEM raster when raster export runs. Default: `false`.
    pub create_dem: bool,

    /// Raster cell size, forwarded to the rasterizer unvalidated. Default: `1.0`.
    pub pixel_size: f64,
}

impl ConversionOptions {
    pub fn requests(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }
}

// ── Pipeline tuning ──────────────────────────────────────────────────────

/// Execution settings that do not change what a request produces.
///
/// Kept out of [`ConversionOptions`] so they never take part in the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of raster jobs in flight at once. Default: 1 (sequential).
    ///
    /// Raster jobs read the same vector file and write disjoint outputs, so
    /// they can safely run in parallel.
    pub raster_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raster_concurrency: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_accepts_canonical_and_legacy_names() {
        assert_eq!(Method::parse("vector-export").unwrap(), Method::VectorExport);
        assert_eq!(Method::parse("las2shp").unwrap(), Method::VectorExport);
        assert_eq!(Method::parse("Raster-Export").unwrap(), Method::RasterExport);
        assert_eq!(Method::parse("las2tif").unwrap(), Method::RasterExport);
        assert_eq!(Method::parse("shp2tif").unwrap(), Method::RasterExport);
    }

    #[test]
    fn method_parse_rejects_unknown() {
        assert_eq!(
            Method::parse("las2png"),
            Err(ResolutionError::UnknownMethod {
                method: "las2png".into()
            })
        );
    }

    #[test]
    fn raw_options_ignore_unknown_keys() {
        let opts = RawOptions::from_json_str(r#"{"pixel_size": 2.5, "colour": "red"}"#).unwrap();
        assert_eq!(opts.pixel_size, Some(2.5));
        assert_eq!(opts.methods, None);
    }

    #[test]
    fn raw_options_accept_legacy_key_aliases() {
        let opts = RawOptions::from_json_str(
            r#"{"shapefile_name": "/data/out.shp", "tif_prefix": "/data/tif_"}"#,
        )
        .unwrap();
        assert_eq!(opts.vector_path, Some(PathBuf::from("/data/out.shp")));
        assert_eq!(opts.raster_prefix.as_deref(), Some("/data/tif_"));
    }

    #[test]
    fn raw_options_keep_explicit_false_and_empty() {
        let opts = RawOptions::from_json_str(r#"{"overwrite": false, "extract_attributes": []}"#)
            .unwrap();
        assert_eq!(opts.overwrite, Some(false));
        assert_eq!(opts.extract_attributes, Some(vec![]));
    }

    #[test]
    fn raw_options_wrong_type_is_invalid() {
        let err = RawOptions::from_json_str(r#"{"pixel_size": "big"}"#).unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidOptions { .. }));
    }

    #[test]
    fn method_serialises_kebab_case() {
        let json = serde_json::to_string(&Method::RasterExport).unwrap();
        assert_eq!(json, "\"raster-export\"");
    }
}
