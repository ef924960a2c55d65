//! Reshaping of upstream payloads into the fixed result envelope.
//!
//! [`shape`] is total over arbitrary JSON: anything missing or of the wrong
//! type falls back to a default, so a parseable payload always yields a
//! well-formed page. It is also idempotent, which lets the widget re-apply the
//! same rules to pages it fetches on its own.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::query::ValidatedQuery;

/// A book author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name, usually "Last, First".
    pub name: String,
    /// Birth year, `null` when unknown.
    pub birth_year: Option<i64>,
    /// Death year, `null` when unknown.
    pub death_year: Option<i64>,
}

/// A single catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Catalogue id.
    pub id: u64,
    /// Title.
    pub title: String,
    /// Authors in upstream order.
    pub authors: Vec<Author>,
    /// Language codes in upstream order.
    pub languages: Vec<String>,
    /// Number of downloads in the last 30 days.
    pub download_count: u64,
    /// MIME type to download URL.
    pub formats: IndexMap<String, String>,
}

/// One page of shaped results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPage {
    /// Books on this page.
    pub results: Vec<Book>,
    /// Total matches across all pages.
    pub count: u64,
    /// URL of the next page.
    pub next: Option<String>,
    /// URL of the previous page.
    pub previous: Option<String>,
}

impl ResultPage {
    /// Number of books on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether this page holds no books.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A shaped page plus the query that produced it.
///
/// Serialises to `{results, count, next, previous, query}`, the shape the
/// widget consumes on first load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultEnvelope {
    /// The shaped page.
    #[serde(flatten)]
    pub page: ResultPage,
    /// The validated query, echoed back.
    pub query: ValidatedQuery,
}

/// Shapes an upstream payload.
#[must_use]
pub fn shape(payload: &Value) -> ResultPage {
    let empty = Map::new();
    let root = payload.as_object().unwrap_or(&empty);

    let results: Vec<Book> = root
        .get("results")
        .and_then(Value::as_array)
        .map(|records| records.iter().map(shape_book).collect())
        .unwrap_or_default();

    let count = root
        .get("count")
        .and_then(as_count)
        .unwrap_or(results.len() as u64);

    ResultPage {
        count,
        next: string_field(root, "next"),
        previous: string_field(root, "previous"),
        results,
    }
}

fn shape_book(record: &Value) -> Book {
    let empty = Map::new();
    let record = record.as_object().unwrap_or(&empty);

    Book {
        id: record.get("id").and_then(as_count).unwrap_or(0),
        title: string_field(record, "title").unwrap_or_default(),
        authors: record
            .get("authors")
            .and_then(Value::as_array)
            .map(|authors| authors.iter().map(shape_author).collect())
            .unwrap_or_default(),
        languages: record
            .get("languages")
            .and_then(Value::as_array)
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        download_count: record
            .get("download_count")
            .and_then(as_count)
            .unwrap_or(0),
        formats: record
            .get("formats")
            .and_then(Value::as_object)
            .map(|formats| {
                formats
                    .iter()
                    .filter_map(|(mime, url)| url.as_str().map(|u| (mime.clone(), u.to_string())))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn shape_author(author: &Value) -> Author {
    let empty = Map::new();
    let author = author.as_object().unwrap_or(&empty);

    Author {
        name: string_field(author, "name").unwrap_or_default(),
        birth_year: author.get("birth_year").and_then(as_year),
        death_year: author.get("death_year").and_then(as_year),
    }
}

/// Reads a signed year. Whole-valued floats count; fractional ones do not,
/// matching `Number.isInteger` in the widget.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)] // range checked first; fract() of a whole float is exactly 0.0
fn as_year(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0)
        .filter(|f| *f >= i64::MIN as f64 && *f < i64::MAX as f64)
        .map(|f| f as i64)
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Reads a non-negative integer, clamping negatives to zero and truncating
/// whole-valued floats.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to >= 0 first
fn as_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    if value.as_i64().is_some() {
        return Some(0);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.max(0.0) as u64)
}
