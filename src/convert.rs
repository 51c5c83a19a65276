//! Conversion entry points.
//!
//! [`Converter`] is the explicit composition of the pieces:
//!
//! ```text
//! ConvertRequest ─▶ OptionResolver ─▶ CacheKey ─▶ ConversionCache ─▶ ConversionPipeline
//!                                                      │ hit
//!                                                      └─▶ stored Outcome
//! ```
//!
//! The observer hears the cache decision before any stage event, and the
//! final outcome in either case.
//!
//! [`process_file`] uses a process-wide converter with the PDAL and GDAL
//! backends, so its cache lives as long as the process.

use crate::actions::{ActionLogger, ConversionObserver};
use crate::backend::gdal::GdalRasterizer;
use crate::backend::pdal::PdalPointLoader;
use crate::backend::{PointLoader, Rasterizer};
use crate::config::{PipelineConfig, RawOptions};
use crate::error::ConvertError;
use crate::fields::FieldTable;
use crate::output::Outcome;
use crate::pipeline::cache::{CacheKey, ConversionCache};
use crate::pipeline::orchestrate::ConversionPipeline;
use crate::pipeline::resolve::{ConvertRequest, OptionResolver};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Resolves, memoizes and runs conversion requests.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Converter {
    resolver: OptionResolver,
    cache: ConversionCache,
    pipeline: ConversionPipeline,
    observer: Arc<dyn ConversionObserver>,
}

impl Converter {
    pub fn builder() -> ConverterBuilder {
        ConverterBuilder::default()
    }

    /// Run one request, or return the stored outcome of an identical one.
    ///
    /// # Errors
    /// Returns `Err` only for fatal errors:
    /// - the request or its options are invalid
    /// - the point loader failed (nothing is cached; a retry runs again)
    ///
    /// A missing vector artifact is `Ok(Outcome::Failure(..))`.
    pub async fn process(&self, request: &ConvertRequest) -> Result<Outcome, ConvertError> {
        let resolved = self.resolver.resolve_request(request)?;
        let key = CacheKey::new(&resolved)?;
        info!(
            "Processing {} (EPSG:{}) [{}]",
            resolved.source.display(),
            resolved.epsg,
            key
        );
        self.observer
            .on_conversion_start(&resolved.source, resolved.epsg);

        let observer = &*self.observer;
        let pipeline = &self.pipeline;
        let resolved = &resolved;
        let key_ref = &key;
        let cached = self
            .cache
            .get_or_compute(&key, move || async move {
                observer.on_cache_lookup(key_ref, false);
                pipeline.run(resolved, observer).await
            })
            .await?;

        if cached.hit {
            self.observer.on_cache_lookup(&key, true);
        }
        self.observer.on_conversion_complete(
            &resolved.source,
            resolved.epsg,
            &cached.outcome,
            cached.hit,
        );
        Ok(cached.outcome)
    }

    /// Run one request and report whether the vector artifact exists.
    ///
    /// Raster failures do not make this `false`; use [`Converter::process`]
    /// to inspect them.
    pub async fn process_file(
        &self,
        source_file_name: impl Into<PathBuf>,
        epsg: u32,
        options: RawOptions,
    ) -> Result<bool, ConvertError> {
        let request = ConvertRequest::new(source_file_name, epsg, options);
        Ok(self.process(&request).await?.is_success())
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    pub fn resolver(&self) -> &OptionResolver {
        &self.resolver
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`Converter`].
///
/// Unset collaborators default to [`PdalPointLoader`] and [`GdalRasterizer`];
/// the observer defaults to an [`ActionLogger`].
#[derive(Default)]
pub struct ConverterBuilder {
    base_dir: Option<PathBuf>,
    point_loader: Option<Arc<dyn PointLoader>>,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    field_table: Option<FieldTable>,
    observer: Option<Arc<dyn ConversionObserver>>,
    config: PipelineConfig,
}

impl ConverterBuilder {
    /// Directory for default output paths. Default: the working directory at
    /// build time.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn point_loader(mut self, loader: Arc<dyn PointLoader>) -> Self {
        self.point_loader = Some(loader);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Attribute → vector field mapping shared by both stages.
    pub fn field_table(mut self, fields: FieldTable) -> Self {
        self.field_table = Some(fields);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Maximum raster jobs in flight. Must be at least 1.
    pub fn raster_concurrency(mut self, n: usize) -> Self {
        self.config.raster_concurrency = n;
        self
    }

    /// Build the converter, validating the configuration.
    pub fn build(self) -> Result<Converter, ConvertError> {
        if self.config.raster_concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "raster_concurrency must be at least 1".into(),
            ));
        }

        let resolver = match self.base_dir {
            Some(dir) => OptionResolver::new(dir),
            None => OptionResolver::from_current_dir().map_err(|e| {
                ConvertError::InvalidConfig(format!("cannot read working directory: {e}"))
            })?,
        };

        let fields = self.field_table.unwrap_or_default();
        let loader = self
            .point_loader
            .unwrap_or_else(|| Arc::new(PdalPointLoader::new(fields.clone())));
        let rasterizer = self
            .rasterizer
            .unwrap_or_else(|| Arc::new(GdalRasterizer::new()));
        let observer = self
            .observer
            .unwrap_or_else(|| Arc::new(ActionLogger::new()));

        Ok(Converter {
            resolver,
            cache: ConversionCache::new(),
            pipeline: ConversionPipeline::new(loader, rasterizer)
                .with_field_table(fields)
                .with_config(self.config),
            observer,
        })
    }
}

// ── Process-wide entry points ────────────────────────────────────────────

static DEFAULT_CONVERTER: OnceCell<Converter> = OnceCell::new();

/// The process-wide converter, built on first use.
pub fn default_converter() -> Result<&'static Converter, ConvertError> {
    DEFAULT_CONVERTER.get_or_try_init(|| Converter::builder().build())
}

/// Convert `source_file_name` (in `epsg`) to a vector file and the rasters
/// requested in `options`.
///
/// Returns `Ok(false)` when the vector artifact could not be produced.
/// Identical requests within one process return the first outcome without
/// running the backends again.
///
/// # Example
/// ```rust,no_run
/// use las2geo::{process_file, RawOptions};
///
/// # async fn run() -> Result<(), las2geo::ConvertError> {
/// let ok = process_file(
///     "plot1.las",
///     32632,
///     RawOptions::new().methods(["las2shp", "las2tif"]),
/// )
/// .await?;
/// assert!(ok);
/// # Ok(())
/// # }
/// ```
pub async fn process_file(
    source_file_name: impl Into<PathBuf>,
    epsg: u32,
    options: RawOptions,
) -> Result<bool, ConvertError> {
    default_converter()?
        .process_file(source_file_name, epsg, options)
        .await
}

/// Synchronous wrapper around [`process_file`].
///
/// Creates a temporary single-use tokio runtime. Do not call from within an
/// async context; use [`process_file`] there.
pub fn process_file_sync(
    source_file_name: impl Into<PathBuf>,
    epsg: u32,
    options: RawOptions,
) -> Result<bool, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_file(source_file_name, epsg, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;

    #[test]
    fn zero_raster_concurrency_is_rejected() {
        let err = Converter::builder()
            .base_dir(".")
            .raster_concurrency(0)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
    }

    #[test]
    fn builder_uses_given_base_dir() {
        let c = Converter::builder().base_dir("/work").build().unwrap();
        assert_eq!(c.resolver().base_dir(), std::path::Path::new("/work"));
        assert!(c.cache().is_empty());
    }

    #[test]
    fn invalid_request_is_fatal_and_not_cached() {
        let c = Converter::builder().base_dir("/work").build().unwrap();
        let err = tokio_test::block_on(c.process_file("plot1.las", 0, RawOptions::new()))
            .unwrap_err();
        assert!(matches!(err, ConvertError::Resolution(_)));
        assert!(c.cache().is_empty());
    }

    #[test]
    fn process_wide_entry_points_share_one_converter() {
        let first = default_converter().unwrap();
        assert!(std::ptr::eq(first, default_converter().unwrap()));

        let err = process_file_sync("plot1.las", 0, RawOptions::new()).unwrap_err();
        assert!(matches!(err, ConvertError::Resolution(ResolutionError::InvalidEpsg { epsg: 0 })));

        let err = tokio_test::block_on(process_file("", 32632, RawOptions::new())).unwrap_err();
        assert!(matches!(err, ConvertError::Resolution(ResolutionError::EmptySourceName)));

        assert!(first.cache().is_empty());
    }
}
