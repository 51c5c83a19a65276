//! Orchestration stages for point-cloud conversion.
//!
//! ## Data Flow
//!
//! ```text
//! ConvertRequest ──▶ resolve ──▶ cache ──▶ vector ──▶ raster
//!   (raw options)   (defaults)  (single   (stage A)  (stage B)
//!                               flight)
//! ```
//!
//! 1. [`resolve`]: fill every option from caller values or defaults; pure
//! 2. [`cache`]: key the resolved request and memoize its outcome
//! 3. [`vector`]: make sure the vector artifact exists, exporting it if asked
//!    or missing; the only stage that can end a request early
//! 4. [`raster`]: burn one raster per attribute, each job independent
//!
//! [`orchestrate`] ties stages A and B together; the cache sits in front of it
//! in [`crate::convert::Converter`].

pub mod cache;
pub mod orchestrate;
pub mod raster;
pub mod resolve;
pub mod vector;
