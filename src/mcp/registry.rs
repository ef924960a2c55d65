//! Tool and resource catalogue.
//!
//! The registry is built once at startup and never mutated, so every session
//! shares it behind an `Arc` without locking. Construction fails if a widget
//! template cannot be loaded or if a tool's output template points at a
//! resource that does not exist.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::books::query::{SortOrder, URL_FIELD};
use crate::error::RegistryError;

/// Name of the book search tool.
pub const SEARCH_TOOL: &str = "search";

/// URI of the search results widget.
pub const WIDGET_URI: &str = "ui://widget/book-search.html";

/// MIME type marking a resource as a widget template.
pub const WIDGET_MIME_TYPE: &str = "text/html+skybridge";

/// Widget template bundled into the binary.
pub const EMBEDDED_WIDGET: &str = include_str!("../../assets/book-search.html");

/// Metadata key linking a tool to the resource that renders its output.
pub const OUTPUT_TEMPLATE_KEY: &str = "openai/outputTemplate";

const INVOKING_KEY: &str = "openai/toolInvocation/invoking";
const INVOKED_KEY: &str = "openai/toolInvocation/invoked";
const WIDGET_ACCESSIBLE_KEY: &str = "openai/widgetAccessible";
const CAN_PRODUCE_WIDGET_KEY: &str = "openai/resultCanProduceWidget";

/// Builds the metadata block shared by a tool and its widget resource.
#[must_use]
pub fn widget_meta(template_uri: &str, invoking: &str, invoked: &str) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert(OUTPUT_TEMPLATE_KEY.to_string(), json!(template_uri));
    meta.insert(INVOKING_KEY.to_string(), json!(invoking));
    meta.insert(INVOKED_KEY.to_string(), json!(invoked));
    meta.insert(WIDGET_ACCESSIBLE_KEY.to_string(), json!(true));
    meta.insert(CAN_PRODUCE_WIDGET_KEY.to_string(), json!(true));
    meta
}

/// A callable tool, serialised as a `tools/list` entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name, used for dispatch.
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's arguments. Advisory only.
    pub input_schema: Value,
    /// Widget metadata block.
    #[serde(rename = "_meta")]
    pub meta: Map<String, Value>,
}

impl ToolDescriptor {
    /// URI of the resource that renders this tool's output, if any.
    #[must_use]
    pub fn output_template(&self) -> Option<&str> {
        self.meta.get(OUTPUT_TEMPLATE_KEY).and_then(Value::as_str)
    }
}

/// An addressable resource holding rendered widget markup.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Unique URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Description shown to the client.
    pub description: String,
    /// MIME type of `text`.
    pub mime_type: String,
    /// Rendered content.
    pub text: String,
    /// Widget metadata block.
    pub meta: Map<String, Value>,
}

impl ResourceDescriptor {
    /// `resources/list` entry. Content is omitted.
    #[must_use]
    pub fn listing(&self) -> Value {
        json!({
            "uri": self.uri,
            "name": self.name,
            "description": self.description,
            "mimeType": self.mime_type,
            "_meta": self.meta,
        })
    }

    /// `resources/templates/list` entry.
    #[must_use]
    pub fn template_listing(&self) -> Value {
        json!({
            "uriTemplate": self.uri,
            "name": self.name,
            "description": self.description,
            "mimeType": self.mime_type,
            "_meta": self.meta,
        })
    }

    /// `resources/read` content item.
    #[must_use]
    pub fn contents(&self) -> Value {
        json!({
            "uri": self.uri,
            "mimeType": self.mime_type,
            "text": self.text,
            "_meta": self.meta,
        })
    }
}

/// Immutable catalogue of tools and resources.
#[derive(Debug, Clone)]
pub struct Registry {
    tools: Vec<ToolDescriptor>,
    resources: Vec<ResourceDescriptor>,
}

impl Registry {
    /// Builds a registry from explicit catalogues.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate names or URIs, empty resource content,
    /// or an output template that names an unregistered resource.
    pub fn new(
        tools: Vec<ToolDescriptor>,
        resources: Vec<ResourceDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut uris = HashSet::new();
        for resource in &resources {
            if !uris.insert(resource.uri.as_str()) {
                return Err(RegistryError::DuplicateResource {
                    uri: resource.uri.clone(),
                });
            }
            if resource.text.trim().is_empty() {
                return Err(RegistryError::EmptyTemplate {
                    uri: resource.uri.clone(),
                });
            }
        }

        let mut names = HashSet::new();
        for tool in &tools {
            if !names.insert(tool.name.as_str()) {
                return Err(RegistryError::DuplicateTool {
                    name: tool.name.clone(),
                });
            }
            if let Some(uri) = tool.output_template() {
                if !uris.contains(uri) {
                    return Err(RegistryError::DanglingTemplate {
                        tool: tool.name.clone(),
                        uri: uri.to_string(),
                    });
                }
            }
        }

        Ok(Self { tools, resources })
    }

    /// Builds the book search catalogue around the given widget markup.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup is empty.
    pub fn with_widget_html(html: impl Into<String>) -> Result<Self, RegistryError> {
        let meta = widget_meta(WIDGET_URI, "Searching books", "Found books");
        Self::new(
            vec![search_tool(meta.clone())],
            vec![ResourceDescriptor {
                uri: WIDGET_URI.to_string(),
                name: "Book search results".to_string(),
                description: "Paginated list of books returned by the search tool".to_string(),
                mime_type: WIDGET_MIME_TYPE.to_string(),
                text: html.into(),
                meta,
            }],
        )
    }

    /// Loads the widget from `template_path`, or the embedded copy when
    /// `None`, and builds the catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be read or is empty.
    pub fn load(template_path: Option<&Path>) -> Result<Self, RegistryError> {
        let html = match template_path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading widget template");
                std::fs::read_to_string(path).map_err(|source| RegistryError::TemplateLoad {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => EMBEDDED_WIDGET.to_string(),
        };
        Self::with_widget_html(html)
    }

    /// All tools, in registration order.
    #[must_use]
    pub fn list_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// All resources, in registration order.
    #[must_use]
    pub fn list_resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    /// Resources advertised as templates. Every resource here has a fixed
    /// URI, so this is the full resource catalogue.
    #[must_use]
    pub fn list_resource_templates(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    /// Looks up a resource by URI.
    #[must_use]
    pub fn resolve_resource(&self, uri: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.uri == uri)
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn resolve_tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}

fn search_tool(meta: Map<String, Value>) -> ToolDescriptor {
    let sort_values: Vec<&str> = SortOrder::ALL.iter().map(|s| s.as_str()).collect();

    ToolDescriptor {
        name: SEARCH_TOOL.to_string(),
        title: "Search books".to_string(),
        description: "Search the Project Gutenberg catalogue. Filter by free text, language, \
                      author years, format, topic, ids or copyright status, and sort by \
                      popularity or id. To fetch another page, pass the `next` or `previous` \
                      URL from an earlier result as `url`; all other arguments are then ignored."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "search": {
                    "type": "string",
                    "description": "Words to match against titles and author names"
                },
                "languages": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Two-letter language codes, e.g. [\"en\", \"fr\"]"
                },
                "author_year_start": {
                    "type": "integer",
                    "description": "Only authors alive on or after this year (negative for BCE)"
                },
                "author_year_end": {
                    "type": "integer",
                    "description": "Only authors alive on or before this year"
                },
                "mime_type": {
                    "type": "string",
                    "description": "MIME-type prefix a format must match, e.g. \"text/\""
                },
                "topic": {
                    "type": "string",
                    "description": "Case-insensitive substring of a subject or bookshelf"
                },
                "ids": {
                    "type": "array",
                    "items": { "type": "integer" },
                    "description": "Catalogue ids to fetch"
                },
                "copyright": {
                    "type": "string",
                    "description": "Comma list drawn from true, false, null"
                },
                "sort": {
                    "type": "string",
                    "enum": sort_values,
                    "description": "Result ordering (default popular)"
                },
                "page": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "One-based page number"
                },
                URL_FIELD: {
                    "type": "string",
                    "description": "A next/previous URL from an earlier result"
                }
            },
            "additionalProperties": false
        }),
        meta,
    }
}
