//! Argument normalisation for the `search` tool.
//!
//! Tool arguments arrive as a loosely-typed JSON object. [`normalize`] turns
//! them into a [`ValidatedQuery`]: either a continuation URL handed back by a
//! previous page, or a canonical parameter set whose names match the upstream
//! query string one-to-one.
//!
//! # Precedence
//!
//! A non-empty `url` argument wins over every other field. The remaining
//! fields are ignored rather than rejected, so a client that echoes its
//! previous arguments alongside `next` still pages correctly.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::ValidationError;

/// Argument carrying an upstream continuation URL.
pub const URL_FIELD: &str = "url";

/// Upstream parameter names, in the order they are serialised.
pub const PARAM_NAMES: [&str; 10] = [
    "search",
    "languages",
    "author_year_start",
    "author_year_end",
    "mime_type",
    "topic",
    "ids",
    "copyright",
    "sort",
    "page",
];

const COPYRIGHT_VALUES: [&str; 3] = ["true", "false", "null"];

/// Result ordering supported by the upstream catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Most downloaded first (upstream default).
    Popular,
    /// Ascending book id.
    Ascending,
    /// Descending book id.
    Descending,
}

impl SortOrder {
    /// All accepted values, in declaration order.
    pub const ALL: [Self; 3] = [Self::Popular, Self::Ascending, Self::Descending];

    /// Returns the upstream spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|order| order.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new("sort", "must be one of: popular, ascending, descending")
            })
    }
}

/// Search fields that survived validation.
///
/// Every field is optional; absent fields are never sent upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchParams {
    /// Free-text match against titles and author names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Two-letter language codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    /// Earliest author birth/death year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_year_start: Option<i64>,
    /// Latest author birth/death year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_year_end: Option<i64>,
    /// MIME-type prefix a book must offer a format for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Substring of a subject or bookshelf.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Explicit catalogue ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<u64>>,
    /// Copyright filter, comma list of `true`, `false`, `null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    /// Result ordering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
    /// One-based page number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl SearchParams {
    /// Returns the upstream query parameters in [`PARAM_NAMES`] order.
    #[must_use]
    pub fn to_query_pairs(&self) -> IndexMap<&'static str, String> {
        let mut pairs = IndexMap::new();
        if let Some(search) = &self.search {
            pairs.insert("search", search.clone());
        }
        if let Some(languages) = &self.languages {
            pairs.insert("languages", languages.join(","));
        }
        if let Some(start) = self.author_year_start {
            pairs.insert("author_year_start", start.to_string());
        }
        if let Some(end) = self.author_year_end {
            pairs.insert("author_year_end", end.to_string());
        }
        if let Some(mime_type) = &self.mime_type {
            pairs.insert("mime_type", mime_type.clone());
        }
        if let Some(topic) = &self.topic {
            pairs.insert("topic", topic.clone());
        }
        if let Some(ids) = &self.ids {
            let joined: Vec<String> = ids.iter().map(u64::to_string).collect();
            pairs.insert("ids", joined.join(","));
        }
        if let Some(copyright) = &self.copyright {
            pairs.insert("copyright", copyright.clone());
        }
        if let Some(sort) = self.sort {
            pairs.insert("sort", sort.as_str().to_string());
        }
        if let Some(page) = self.page {
            pairs.insert("page", page.to_string());
        }
        pairs
    }
}

/// A search request ready to be sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ValidatedQuery {
    /// Follow a `next`/`previous` URL verbatim.
    Continuation {
        /// Absolute upstream URL.
        url: String,
    },
    /// Query the search endpoint with these parameters.
    Search(SearchParams),
}

impl ValidatedQuery {
    /// Returns the continuation URL when this query follows one.
    #[must_use]
    pub fn continuation_url(&self) -> Option<&str> {
        match self {
            Self::Continuation { url } => Some(url),
            Self::Search(_) => None,
        }
    }

    /// Returns the outbound query parameters. Empty for continuations.
    #[must_use]
    pub fn query_pairs(&self) -> IndexMap<&'static str, String> {
        match self {
            Self::Continuation { .. } => IndexMap::new(),
            Self::Search(params) => params.to_query_pairs(),
        }
    }
}

/// Validates a raw argument bag.
///
/// `null` is treated as an empty object.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the first offending field.
pub fn normalize(args: &Value) -> Result<ValidatedQuery, ValidationError> {
    let empty = Map::new();
    let args = match args {
        Value::Null => &empty,
        Value::Object(map) => map,
        _ => return Err(ValidationError::new("arguments", "expected an object")),
    };

    if let Some(url) = optional_string(args, URL_FIELD)? {
        return Ok(ValidatedQuery::Continuation { url });
    }

    let params = SearchParams {
        search: optional_string(args, "search")?,
        languages: optional_list(args, "languages")?
            .map(|codes| codes.into_iter().map(|c| c.to_lowercase()).collect()),
        author_year_start: optional_integer(args, "author_year_start")?,
        author_year_end: optional_integer(args, "author_year_end")?,
        mime_type: optional_string(args, "mime_type")?,
        topic: optional_string(args, "topic")?,
        ids: optional_ids(args)?,
        copyright: optional_copyright(args)?,
        sort: optional_string(args, "sort")?
            .map(|s| s.parse::<SortOrder>())
            .transpose()?,
        page: optional_page(args)?,
    };

    Ok(ValidatedQuery::Search(params))
}

/// Looks up a field, treating `null` as absent.
fn present<'a>(args: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    args.get(field).filter(|v| !v.is_null())
}

fn optional_string(
    args: &Map<String, Value>,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match present(args, field) {
        None => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(_) => Err(ValidationError::new(field, "expected a string")),
    }
}

fn optional_integer(
    args: &Map<String, Value>,
    field: &str,
) -> Result<Option<i64>, ValidationError> {
    match present(args, field) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ValidationError::new(field, "expected an integer")),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ValidationError::new(field, format!("'{trimmed}' is not an integer")))
        }
        Some(_) => Err(ValidationError::new(field, "expected an integer")),
    }
}

fn optional_page(args: &Map<String, Value>) -> Result<Option<u32>, ValidationError> {
    let Some(page) = optional_integer(args, "page")? else {
        return Ok(None);
    };
    u32::try_from(page)
        .ok()
        .filter(|p| *p >= 1)
        .map(Some)
        .ok_or_else(|| ValidationError::new("page", "must be a positive integer"))
}

/// Reads an array or comma-separated string into trimmed, non-empty items.
fn optional_list(
    args: &Map<String, Value>,
    field: &str,
) -> Result<Option<Vec<String>>, ValidationError> {
    let items: Vec<String> = match present(args, field) {
        None => return Ok(None),
        Some(Value::String(s)) => s.split(',').map(|item| item.trim().to_string()).collect(),
        Some(Value::Array(values)) => values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| match v {
                Value::String(s) => Ok(s.trim().to_string()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                _ => Err(ValidationError::new(field, "list items must be scalars")),
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(ValidationError::new(
                field,
                "expected an array or a comma-separated string",
            ))
        }
    };

    let items: Vec<String> = items.into_iter().filter(|item| !item.is_empty()).collect();
    Ok((!items.is_empty()).then_some(items))
}

fn optional_ids(args: &Map<String, Value>) -> Result<Option<Vec<u64>>, ValidationError> {
    let Some(items) = optional_list(args, "ids")? else {
        return Ok(None);
    };
    items
        .iter()
        .map(|item| {
            item.parse::<u64>()
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| ValidationError::new("ids", format!("'{item}' is not a book id")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn optional_copyright(args: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
    if let Some(Value::Bool(flag)) = present(args, "copyright") {
        return Ok(Some(flag.to_string()));
    }
    let Some(items) = optional_list(args, "copyright")? else {
        return Ok(None);
    };
    let mut values: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let value = item.to_lowercase();
        if !COPYRIGHT_VALUES.contains(&value.as_str()) {
            return Err(ValidationError::new(
                "copyright",
                format!("'{item}' must be one of: true, false, null"),
            ));
        }
        if !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(Some(values.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(args: &Value) -> Vec<(String, String)> {
        normalize(args)
            .unwrap()
            .query_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn search_only() {
        assert_eq!(
            pairs(&json!({"search": "alice"})),
            vec![("search".to_string(), "alice".to_string())]
        );
    }

    #[test]
    fn null_arguments_yield_empty_search() {
        let query = normalize(&Value::Null).unwrap();
        assert_eq!(query, ValidatedQuery::Search(SearchParams::default()));
        assert!(query.query_pairs().is_empty());
    }

    #[test]
    fn continuation_url_wins() {
        let query = normalize(&json!({
            "url": "https://gutendex.com/books/?page=2&search=alice",
            "search": "bob",
            "sort": "sideways",
            "page": "not a number"
        }))
        .unwrap();

        assert_eq!(
            query.continuation_url(),
            Some("https://gutendex.com/books/?page=2&search=alice")
        );
        assert!(query.query_pairs().is_empty());
    }

    #[test]
    fn empty_url_falls_through() {
        let query = normalize(&json!({"url": "  ", "topic": "children"})).unwrap();
        assert_eq!(query.continuation_url(), None);
        assert_eq!(query.query_pairs().get("topic").map(String::as_str), Some("children"));
    }

    #[test]
    fn absent_and_empty_fields_are_omitted() {
        let got = pairs(&json!({
            "search": "",
            "languages": [],
            "topic": null,
            "mime_type": "   ",
            "ids": "",
            "author_year_start": 1800
        }));
        assert_eq!(
            got,
            vec![("author_year_start".to_string(), "1800".to_string())]
        );
    }

    #[test]
    fn every_field_maps_to_its_upstream_name() {
        let got = normalize(&json!({
            "page": 3,
            "sort": "descending",
            "copyright": false,
            "ids": [11, "84"],
            "topic": "children",
            "mime_type": "text/",
            "author_year_end": "1900",
            "author_year_start": -500,
            "languages": "EN, fr",
            "search": "dickens great"
        }))
        .unwrap()
        .query_pairs();

        let keys: Vec<&str> = got.keys().copied().collect();
        assert_eq!(keys, PARAM_NAMES.to_vec());
        assert_eq!(got["languages"], "en,fr");
        assert_eq!(got["author_year_start"], "-500");
        assert_eq!(got["author_year_end"], "1900");
        assert_eq!(got["ids"], "11,84");
        assert_eq!(got["copyright"], "false");
        assert_eq!(got["sort"], "descending");
        assert_eq!(got["page"], "3");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        assert_eq!(
            pairs(&json!({"search": "poe", "colour": "blue"})),
            vec![("search".to_string(), "poe".to_string())]
        );
    }

    #[test]
    fn reject_unknown_sort() {
        let err = normalize(&json!({"sort": "sideways"})).unwrap_err();
        assert_eq!(err.field, "sort");
    }

    #[test]
    fn reject_fractional_year() {
        let err = normalize(&json!({"author_year_start": 1800.5})).unwrap_err();
        assert_eq!(err.field, "author_year_start");
    }

    #[test]
    fn reject_non_numeric_year_string() {
        let err = normalize(&json!({"author_year_end": "eighteen"})).unwrap_err();
        assert_eq!(err.field, "author_year_end");
        assert!(err.reason.contains("eighteen"));
    }

    #[test]
    fn reject_zero_page() {
        let err = normalize(&json!({"page": 0})).unwrap_err();
        assert_eq!(err.field, "page");
    }

    #[test]
    fn reject_bad_ids() {
        let err = normalize(&json!({"ids": "1,two"})).unwrap_err();
        assert_eq!(err.field, "ids");
    }

    #[test]
    fn reject_bad_copyright() {
        let err = normalize(&json!({"copyright": "maybe"})).unwrap_err();
        assert_eq!(err.field, "copyright");
    }

    #[test]
    fn copyright_list_is_deduplicated() {
        let got = pairs(&json!({"copyright": "true, NULL,true"}));
        assert_eq!(got, vec![("copyright".to_string(), "true,null".to_string())]);
    }

    #[test]
    fn reject_non_object_arguments() {
        let err = normalize(&json!(["search", "alice"])).unwrap_err();
        assert_eq!(err.field, "arguments");
    }

    #[test]
    fn reject_non_string_search() {
        let err = normalize(&json!({"search": 42})).unwrap_err();
        assert_eq!(err.field, "search");
    }

    #[test]
    fn echoed_query_serialises_present_fields_only() {
        let query = normalize(&json!({"search": "alice", "languages": ["en"]})).unwrap();
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"search": "alice", "languages": ["en"]})
        );

        let query = normalize(&json!({"url": "https://gutendex.com/books/?page=2"})).unwrap();
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({"url": "https://gutendex.com/books/?page=2"})
        );
    }

    #[test]
    fn sort_order_round_trip_names() {
        for order in SortOrder::ALL {
            assert_eq!(order.as_str().parse::<SortOrder>().unwrap(), order);
        }
    }
}
