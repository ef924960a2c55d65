//! Integration tests for MCP protocol handling.
//!
//! These tests drive the dispatcher with raw JSON-RPC lines against a fake
//! upstream catalogue, covering the search tool end to end plus the resource
//! and error paths.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use book_search_mcp::books::UpstreamClient;
use book_search_mcp::mcp::protocol::{parse_message, ErrorCode, IncomingMessage, RequestId};
use book_search_mcp::mcp::registry::{Registry, OUTPUT_TEMPLATE_KEY, WIDGET_URI};
use book_search_mcp::mcp::Dispatcher;

fn dispatcher_for(base_url: &str) -> Dispatcher {
    let registry = Arc::new(Registry::load(None).unwrap());
    let upstream = UpstreamClient::new(reqwest::Client::new(), base_url).unwrap();
    Dispatcher::new(registry, upstream, CancellationToken::new())
}

async fn call(dispatcher: &Dispatcher, line: &str) -> Value {
    let reply = dispatcher.handle_line(line).await.expect("expected a reply");
    serde_json::to_value(reply).unwrap()
}

fn tools_call(id: u64, arguments: &Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": "search", "arguments": arguments},
    })
    .to_string()
}

fn alice_payload() -> Value {
    json!({
        "count": 1,
        "next": null,
        "previous": null,
        "results": [{
            "id": 11,
            "title": "Alice's Adventures in Wonderland",
            "authors": [{"name": "Carroll, Lewis"}],
            "languages": ["en"],
            "download_count": 12345,
            "formats": {
                "text/html": "https://www.gutenberg.org/ebooks/11.html.images",
                "application/epub+zip": "https://www.gutenberg.org/ebooks/11.epub3.images"
            },
            "subjects": ["Fantasy fiction"],
            "copyright": false
        }]
    })
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_tools_call_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-1",
        "method": "tools/call",
        "params": {"name": "search", "arguments": {"search": "dickens"}}
    }"#;

    if let IncomingMessage::Request(req) = parse_message(json).unwrap() {
        assert_eq!(req.method, "tools/call");
        assert_eq!(req.id, RequestId::String("call-1".to_string()));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    if let IncomingMessage::Notification(notif) = parse_message(json).unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_invalid_json() {
    assert!(parse_message("not valid json").is_err());
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    assert!(parse_message(json).is_err());
}

// =============================================================================
// Search Tool Tests
// =============================================================================

#[tokio::test]
async fn test_search_shapes_upstream_payload() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .and(query_param("search", "alice"))
        .and(query_param("languages", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(alice_payload()))
        .expect(1)
        .mount(&upstream)
        .await;

    let dispatcher = dispatcher_for(&format!("{}/books", upstream.uri()));
    let reply = call(
        &dispatcher,
        &tools_call(1, &json!({"search": "  alice ", "languages": "EN"})),
    )
    .await;

    let result = &reply["result"];
    assert!(result.get("isError").is_none());
    assert_eq!(result["content"][0]["type"], "text");
    assert_eq!(result["content"][0]["text"], "Found 1 books");
    assert_eq!(result["_meta"][OUTPUT_TEMPLATE_KEY], WIDGET_URI);

    let structured = &result["structuredContent"];
    assert_eq!(structured["count"], 1);
    assert!(structured["next"].is_null());
    assert!(structured["previous"].is_null());
    assert_eq!(structured["query"], json!({"search": "alice", "languages": ["en"]}));

    let book = &structured["results"][0];
    assert_eq!(book["id"], 11);
    assert_eq!(book["title"], "Alice's Adventures in Wonderland");
    assert_eq!(book["download_count"], 12345);
    assert_eq!(
        book["authors"],
        json!([{"name": "Carroll, Lewis", "birth_year": null, "death_year": null}])
    );
    assert!(book.get("subjects").is_none());
    assert!(book.get("copyright").is_none());

    let formats: Vec<&String> = book["formats"].as_object().unwrap().keys().collect();
    assert_eq!(formats, ["text/html", "application/epub+zip"]);
}

#[tokio::test]
async fn test_upstream_failure_is_tool_error() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&upstream)
        .await;

    let dispatcher = dispatcher_for(&format!("{}/books", upstream.uri()));
    let reply = call(&dispatcher, &tools_call(2, &json!({"search": "x"}))).await;

    let result = &reply["result"];
    assert_eq!(result["isError"], true);
    assert!(result.get("structuredContent").is_none());
    assert!(result["content"][0]["text"].as_str().unwrap().contains("503"));
}

#[tokio::test]
async fn test_invalid_arguments_never_reach_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(alice_payload()))
        .expect(0)
        .mount(&upstream)
        .await;

    let dispatcher = dispatcher_for(&format!("{}/books", upstream.uri()));
    for (id, arguments) in [
        (3, json!({"sort": "sideways"})),
        (4, json!({"page": 0})),
        (5, json!({"ids": "1,two"})),
        (6, json!("not an object")),
    ] {
        let reply = call(&dispatcher, &tools_call(id, &arguments)).await;
        assert_eq!(reply["result"]["isError"], true, "accepted {arguments}");
        assert!(reply["result"].get("structuredContent").is_none());
    }
}

#[tokio::test]
async fn test_continuation_url_is_followed_verbatim() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/books"))
        .and(query_param("page", "2"))
        .and(query_param("search", "dickens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 64,
            "next": null,
            "previous": format!("{}/books?search=dickens", upstream.uri()),
            "results": []
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let dispatcher = dispatcher_for(&format!("{}/books", upstream.uri()));
    let next = format!("{}/books?page=2&search=dickens", upstream.uri());
    let reply = call(
        &dispatcher,
        &tools_call(7, &json!({"url": next, "search": "ignored", "sort": "sideways"})),
    )
    .await;

    let structured = &reply["result"]["structuredContent"];
    assert_eq!(reply["result"]["content"][0]["text"], "Found 64 books");
    assert_eq!(structured["results"], json!([]));
    assert_eq!(structured["query"], json!({"url": next}));
}

#[tokio::test]
async fn test_missing_fields_get_defaults() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"title": "Untitled"}, "junk"]
        })))
        .mount(&upstream)
        .await;

    let dispatcher = dispatcher_for(&format!("{}/books", upstream.uri()));
    let reply = call(&dispatcher, &tools_call(8, &json!({}))).await;

    let structured = &reply["result"]["structuredContent"];
    assert_eq!(structured["count"], 2);
    assert_eq!(
        structured["results"][0],
        json!({
            "id": 0,
            "title": "Untitled",
            "authors": [],
            "languages": [],
            "download_count": 0,
            "formats": {}
        })
    );
    assert_eq!(structured["results"][1]["title"], "");
}

// =============================================================================
// Catalogue Tests
// =============================================================================

#[tokio::test]
async fn test_tools_list_exposes_widget_metadata() {
    let dispatcher = dispatcher_for("http://127.0.0.1:9/books");
    let reply = call(&dispatcher, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;

    let tools = reply["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    let tool = &tools[0];
    assert_eq!(tool["name"], "search");
    assert_eq!(tool["inputSchema"]["type"], "object");
    assert_eq!(
        tool["inputSchema"]["properties"]["sort"]["enum"],
        json!(["popular", "ascending", "descending"])
    );
    assert_eq!(tool["_meta"]["openai/widgetAccessible"], true);
    assert_eq!(tool["_meta"]["openai/resultCanProduceWidget"], true);
}

#[tokio::test]
async fn test_resources_list_omits_content() {
    let dispatcher = dispatcher_for("http://127.0.0.1:9/books");
    let reply = call(
        &dispatcher,
        r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#,
    )
    .await;

    let resource = &reply["result"]["resources"][0];
    assert_eq!(resource["uri"], WIDGET_URI);
    assert_eq!(resource["mimeType"], "text/html+skybridge");
    assert!(resource.get("text").is_none());
}

#[tokio::test]
async fn test_unknown_resource_is_request_error() {
    let dispatcher = dispatcher_for("http://127.0.0.1:9/books");
    let reply = call(
        &dispatcher,
        r#"{"jsonrpc":"2.0","id":9,"method":"resources/read","params":{"uri":"ui://widget/missing.html"}}"#,
    )
    .await;

    assert_eq!(reply["id"], 9);
    assert_eq!(reply["error"]["code"], ErrorCode::ResourceNotFound.code());
    assert!(reply.get("result").is_none());
}

#[tokio::test]
async fn test_ping() {
    let dispatcher = dispatcher_for("http://127.0.0.1:9/books");
    let reply = call(&dispatcher, r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#).await;
    assert_eq!(reply, json!({"jsonrpc": "2.0", "id": "p", "result": {}}));
}
