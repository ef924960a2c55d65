//! Book search pipeline.
//!
//! A `search` tool call runs three stages:
//!
//! 1. [`query::normalize`] — validate the argument bag into a [`ValidatedQuery`]
//! 2. [`UpstreamClient::fetch`] — one GET against the catalogue
//! 3. [`shape::shape`] — reduce the payload to the fixed [`ResultPage`] shape
//!
//! A validation failure stops before any network traffic; an upstream
//! failure stops before shaping.

pub mod error;
pub mod query;
pub mod shape;
pub mod upstream;

pub use error::{UpstreamError, ValidationError};
pub use query::{normalize, SearchParams, SortOrder, ValidatedQuery};
pub use shape::{shape, Author, Book, ResultEnvelope, ResultPage};
pub use upstream::{UpstreamClient, DEFAULT_BASE_URL};
