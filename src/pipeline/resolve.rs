//! Option resolution: raw request options → fully populated [`ConversionOptions`].
//!
//! Resolution is deterministic. The base directory used for default output
//! paths is captured when the resolver is built, so calling
//! [`OptionResolver::resolve`] twice with the same input always yields the
//! same options, and feeding a resolved set back in changes nothing.

use crate::config::{
    ConversionOptions, Method, RawOptions, DEFAULT_ATTRIBUTE, DEFAULT_PIXEL_SIZE,
    VECTOR_EXTENSION,
};
use crate::error::ResolutionError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// A single conversion request, as issued by a caller.
///
/// Built once per call and only read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertRequest {
    source_file_name: PathBuf,
    epsg: u32,
    options: RawOptions,
}

impl ConvertRequest {
    pub fn new(source_file_name: impl Into<PathBuf>, epsg: u32, options: RawOptions) -> Self {
        Self {
            source_file_name: source_file_name.into(),
            epsg,
            options,
        }
    }

    pub fn source_file_name(&self) -> &Path {
        &self.source_file_name
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn options(&self) -> &RawOptions {
        &self.options
    }
}

/// A request after resolution: the input identity plus complete options.
///
/// This is what the cache keys on and what the pipeline executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    pub source: PathBuf,
    pub epsg: u32,
    pub options: ConversionOptions,
}

/// Fills unset options with defaults derived from the source file name.
#[derive(Debug, Clone)]
pub struct OptionResolver {
    base_dir: PathBuf,
}

impl OptionResolver {
    /// Resolve default output paths relative to `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolve default output paths relative to the process working directory,
    /// read once here.
    pub fn from_current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Validate a request and resolve its options.
    pub fn resolve_request(
        &self,
        request: &ConvertRequest,
    ) -> Result<ResolvedRequest, ResolutionError> {
        if request.epsg == 0 {
            return Err(ResolutionError::InvalidEpsg { epsg: request.epsg });
        }
        let options = self.resolve(&request.options, &request.source_file_name)?;
        Ok(ResolvedRequest {
            source: request.source_file_name.clone(),
            epsg: request.epsg,
            options,
        })
    }

    /// Merge `raw` over the defaults for `source_file_name`.
    ///
    /// A key is taken from `raw` whenever it is present, even if its value is
    /// `false`, `0.0` or an empty list.
    pub fn resolve(
        &self,
        raw: &RawOptions,
        source_file_name: &Path,
    ) -> Result<ConversionOptions, ResolutionError> {
        let stem = source_stem(source_file_name)?;

        let extract_attributes = match &raw.extract_attributes {
            Some(attributes) => dedupe_attributes(attributes)?,
            None => vec![DEFAULT_ATTRIBUTE.to_string()],
        };

        let methods = match &raw.methods {
            Some(names) => names
                .iter()
                .map(|name| Method::parse(name))
                .collect::<Result<BTreeSet<_>, _>>()?,
            None => BTreeSet::from([Method::VectorExport]),
        };

        let vector_path = match &raw.vector_path {
            Some(path) if path.as_os_str().is_empty() => {
                return Err(ResolutionError::EmptyVectorPath)
            }
            Some(path) => path.clone(),
            None => self
                .base_dir
                .join(format!("{stem}.{VECTOR_EXTENSION}")),
        };

        let raster_prefix = match &raw.raster_prefix {
            Some(prefix) => prefix.clone(),
            None => format!("{}_", self.base_dir.join(&stem).to_string_lossy()),
        };

        Ok(ConversionOptions {
            extract_attributes,
            methods,
            vector_path,
            raster_prefix,
            overwrite: raw.overwrite.unwrap_or(true),
            create_dem: raw.create_dem.unwrap_or(false),
            pixel_size: raw.pixel_size.unwrap_or(DEFAULT_PIXEL_SIZE),
        })
    }
}

/// The source file name without its final extension.
fn source_stem(source: &Path) -> Result<String, ResolutionError> {
    if source.as_os_str().is_empty() {
        return Err(ResolutionError::EmptySourceName);
    }
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| ResolutionError::NoFileStem {
            path: source.to_path_buf(),
        })
}

/// Keep the first occurrence of each attribute.
fn dedupe_attributes(attributes: &[String]) -> Result<Vec<String>, ResolutionError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        if attribute.trim().is_empty() {
            return Err(ResolutionError::InvalidOptions {
                reason: "attribute names must not be empty".into(),
            });
        }
        if seen.insert(attribute.as_str()) {
            out.push(attribute.clone());
        }
    }
    Ok(out)
}

/// Turn resolved options back into raw options with every key present.
impl From<&ConversionOptions> for RawOptions {
    fn from(options: &ConversionOptions) -> Self {
        RawOptions {
            extract_attributes: Some(options.extract_attributes.clone()),
            methods: Some(
                options
                    .methods
                    .iter()
                    .map(|m| m.as_str().to_string())
                    .collect(),
            ),
            vector_path: Some(options.vector_path.clone()),
            raster_prefix: Some(options.raster_prefix.clone()),
            overwrite: Some(options.overwrite),
            create_dem: Some(options.create_dem),
            pixel_size: Some(options.pixel_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> OptionResolver {
        OptionResolver::new(".")
    }

    #[test]
    fn empty_options_get_defaults() {
        let opts = resolver()
            .resolve(&RawOptions::new(), Path::new("plot1.las"))
            .unwrap();
        assert_eq!(opts.extract_attributes, vec!["elevation"]);
        assert_eq!(opts.methods, BTreeSet::from([Method::VectorExport]));
        assert_eq!(opts.vector_path, PathBuf::from("./plot1.shp"));
        assert_eq!(opts.raster_prefix, "./plot1_");
        assert!(opts.overwrite);
        assert!(!opts.create_dem);
        assert_eq!(opts.pixel_size, 1.0);
    }

    #[test]
    fn defaults_use_stem_not_directory_of_source() {
        let opts = OptionResolver::new("/work")
            .resolve(&RawOptions::new(), Path::new("/data/survey/tile.v2.laz"))
            .unwrap();
        assert_eq!(opts.vector_path, PathBuf::from("/work/tile.v2.shp"));
        assert_eq!(opts.raster_prefix, "/work/tile.v2_");
    }

    #[test]
    fn explicit_values_win_even_when_falsy() {
        let raw = RawOptions::new()
            .overwrite(false)
            .extract_attributes(Vec::<String>::new())
            .methods(Vec::<String>::new())
            .pixel_size(0.0);
        let opts = resolver().resolve(&raw, Path::new("plot1.las")).unwrap();
        assert!(!opts.overwrite);
        assert!(opts.extract_attributes.is_empty());
        assert!(opts.methods.is_empty());
        assert_eq!(opts.pixel_size, 0.0);
    }

    #[test]
    fn resolution_is_idempotent() {
        let raw = RawOptions::new()
            .methods(["las2shp", "las2tif"])
            .extract_attributes(["intensity", "elevation", "intensity"])
            .create_dem(true);
        let r = resolver();
        let once = r.resolve(&raw, Path::new("plot1.las")).unwrap();
        let twice = r
            .resolve(&RawOptions::from(&once), Path::new("plot1.las"))
            .unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.extract_attributes, vec!["intensity", "elevation"]);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let raw = RawOptions::new().methods(["las2png"]);
        let err = resolver().resolve(&raw, Path::new("plot1.las")).unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownMethod { .. }));
    }

    #[test]
    fn empty_vector_path_is_rejected() {
        let raw = RawOptions::new().vector_path("");
        let err = resolver().resolve(&raw, Path::new("plot1.las")).unwrap_err();
        assert_eq!(err, ResolutionError::EmptyVectorPath);
    }

    #[test]
    fn blank_attribute_is_rejected() {
        let raw = RawOptions::new().extract_attributes(["elevation", " "]);
        let err = resolver().resolve(&raw, Path::new("plot1.las")).unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidOptions { .. }));
    }

    #[test]
    fn request_validation() {
        let r = resolver();
        let err = r
            .resolve_request(&ConvertRequest::new("plot1.las", 0, RawOptions::new()))
            .unwrap_err();
        assert_eq!(err, ResolutionError::InvalidEpsg { epsg: 0 });

        let err = r
            .resolve_request(&ConvertRequest::new("", 32632, RawOptions::new()))
            .unwrap_err();
        assert_eq!(err, ResolutionError::EmptySourceName);

        let err = r
            .resolve_request(&ConvertRequest::new("/", 32632, RawOptions::new()))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::NoFileStem { .. }));
    }
}
