//! Memoization of conversion outcomes (single flight per key).
//!
//! Each key maps to a `tokio::sync::OnceCell`. The first caller runs the
//! computation; concurrent callers with an equal key wait on the same cell and
//! receive the same outcome. A computation that returns `Err` leaves the cell
//! empty, so the next caller computes again.
//!
//! Entries are never updated or evicted while the cache lives. A later
//! request with an equal key gets the stored outcome even if the files on disk
//! have changed since.

use crate::error::{ConvertError, ResolutionError};
use crate::output::Outcome;
use crate::pipeline::resolve::ResolvedRequest;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Length of the hex digest shown in logs.
const DIGEST_LEN: usize = 12;

/// Identity of a resolved request.
///
/// Two keys are equal iff source, EPSG code and every resolved option are
/// equal. Equality is on a canonical JSON rendering with object keys sorted
/// and methods a sorted set, so the rendering is stable. JSON has no NaN or
/// infinity, so `pixel_size` is keyed on its bit pattern instead.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    canonical: String,
    digest: String,
}

impl CacheKey {
    pub fn new(request: &ResolvedRequest) -> Result<Self, ResolutionError> {
        let unkeyable = |e: serde_json::Error| ResolutionError::InvalidOptions {
            reason: format!("request cannot be keyed: {e}"),
        };

        let mut value = serde_json::to_value(request).map_err(unkeyable)?;
        if let Some(options) = value.get_mut("options").and_then(Value::as_object_mut) {
            options.insert(
                "pixel_size".into(),
                Value::String(pixel_size_bits(request.options.pixel_size)),
            );
        }
        let canonical = serde_json::to_string(&value).map_err(unkeyable)?;

        let mut digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        digest.truncate(DIGEST_LEN);
        Ok(Self { canonical, digest })
    }

    /// Short SHA-256 prefix of the canonical form.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// `-0.0` folds into `0.0` and every NaN into one NaN.
fn pixel_size_bits(pixel_size: f64) -> String {
    let normalised = if pixel_size == 0.0 {
        0.0
    } else if pixel_size.is_nan() {
        f64::NAN
    } else {
        pixel_size
    };
    format!("{:016x}", normalised.to_bits())
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.digest).finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// An outcome returned by [`ConversionCache::get_or_compute`].
#[derive(Debug, Clone)]
pub struct CachedOutcome {
    pub outcome: Outcome,
    /// `true` when this caller did not run the computation.
    pub hit: bool,
}

/// Process-lifetime map from [`CacheKey`] to the first computed [`Outcome`].
#[derive(Default)]
pub struct ConversionCache {
    entries: DashMap<CacheKey, Arc<OnceCell<Outcome>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ConversionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored outcome for `key`, or run `compute` to produce it.
    ///
    /// Concurrent callers with an equal key are coalesced: exactly one runs
    /// `compute`. If it fails, the error goes to that caller alone and nothing
    /// is stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<CachedOutcome, ConvertError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Outcome, ConvertError>>,
    {
        // Clone the cell out so the shard lock is released before awaiting.
        let cell = Arc::clone(
            &*self
                .entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );

        if let Some(outcome) = cell.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache hit");
            return Ok(CachedOutcome {
                outcome: outcome.clone(),
                hit: true,
            });
        }

        let mut computed = false;
        let outcome = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await?
            .clone();

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache miss computed");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "coalesced with in-flight computation");
        }

        Ok(CachedOutcome {
            outcome,
            hit: !computed,
        })
    }

    /// Stored outcome for `key`, if one has been computed.
    pub fn get(&self, key: &CacheKey) -> Option<Outcome> {
        self.entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of stored outcomes (in-flight computations excluded).
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored outcome.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawOptions;
    use crate::error::CollaboratorError;
    use crate::output::FailureReason;
    use crate::pipeline::resolve::{ConvertRequest, OptionResolver};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(epsg: u32, raw: RawOptions) -> CacheKey {
        let resolved = OptionResolver::new("/work")
            .resolve_request(&ConvertRequest::new("plot1.las", epsg, raw))
            .unwrap();
        CacheKey::new(&resolved).unwrap()
    }

    fn failure() -> Outcome {
        Outcome::Failure(FailureReason::VectorArtifactMissing {
            path: "/work/plot1.shp".into(),
        })
    }

    #[test]
    fn equal_resolved_requests_give_equal_keys() {
        // Explicit defaults and omitted keys resolve identically.
        let a = key(32632, RawOptions::new());
        let b = key(
            32632,
            RawOptions::new()
                .methods(["las2shp"])
                .extract_attributes(["elevation"])
                .overwrite(true),
        );
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), DIGEST_LEN);
    }

    #[test]
    fn any_differing_field_changes_the_key() {
        let base = key(32632, RawOptions::new());
        assert_ne!(base, key(32633, RawOptions::new()));
        assert_ne!(base, key(32632, RawOptions::new().pixel_size(0.5)));
        assert_ne!(base, key(32632, RawOptions::new().create_dem(true)));
    }

    #[test]
    fn non_finite_pixel_sizes_get_distinct_keys() {
        let with_size = |size: f64| key(32632, RawOptions::new().pixel_size(size));
        let keys = [
            with_size(f64::NAN),
            with_size(f64::INFINITY),
            with_size(f64::NEG_INFINITY),
            with_size(1.0),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(!keys[0].canonical.contains("null"), "{}", keys[0].canonical);
        assert_eq!(with_size(f64::NAN), with_size(-f64::NAN));
    }

    #[test]
    fn signed_zero_pixel_sizes_share_a_key() {
        assert_eq!(
            key(32632, RawOptions::new().pixel_size(0.0)),
            key(32632, RawOptions::new().pixel_size(-0.0))
        );
    }

    #[tokio::test]
    async fn different_pixel_size_is_not_served_from_cache() {
        let cache = ConversionCache::new();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for size in [f64::NAN, f64::INFINITY] {
            let k = key(32632, RawOptions::new().pixel_size(size));
            let got = cache
                .get_or_compute(&k, move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(failure())
                })
                .await
                .unwrap();
            assert!(!got.hit);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_call_does_not_compute() {
        let cache = ConversionCache::new();
        let k = key(32632, RawOptions::new());
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for expected_hit in [false, true] {
            let got = cache
                .get_or_compute(&k, move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(failure())
                })
                .await
                .unwrap();
            assert_eq!(got.hit, expected_hit);
            assert_eq!(got.outcome, failure());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[tokio::test]
    async fn errors_are_not_stored() {
        let cache = ConversionCache::new();
        let k = key(32632, RawOptions::new());

        let err = cache
            .get_or_compute(&k, || async {
                Err(ConvertError::PointLoader(CollaboratorError::Other(
                    "disk full".into(),
                )))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::PointLoader(_)));
        assert!(cache.is_empty());

        let got = cache
            .get_or_compute(&k, || async { Ok(failure()) })
            .await
            .unwrap();
        assert!(!got.hit);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_equal_keys_compute_once() {
        let cache = Arc::new(ConversionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key(32632, RawOptions::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let k = k.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_compute(&k, || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(failure())
                        })
                        .await
                })
            })
            .collect();

        let mut misses = 0;
        for h in handles {
            let got = h.await.unwrap().unwrap();
            assert_eq!(got.outcome, failure());
            if !got.hit {
                misses += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(misses, 1);
    }

    #[tokio::test]
    async fn clear_forgets_outcomes() {
        let cache = ConversionCache::new();
        let k = key(32632, RawOptions::new());
        cache
            .get_or_compute(&k, || async { Ok(failure()) })
            .await
            .unwrap();
        assert!(cache.get(&k).is_some());
        cache.clear();
        assert!(cache.get(&k).is_none());
        assert!(cache.is_empty());
    }
}
