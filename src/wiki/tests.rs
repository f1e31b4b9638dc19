use super::*;
use crate::config::WikiConfig;

fn test_config() -> WikiConfig {
    WikiConfig {
        base_url: "http://wiki.internal:8090".to_string(),
        api_token: Some("secret-token".to_string()),
        timeout_seconds: 30,
    }
}

const PAGE_JSON: &str = r#"{
    "id": "123456",
    "type": "page",
    "title": "Deployment Runbook",
    "body": {
        "storage": {
            "value": "<h1>Deployment</h1><p>Run the deploy script.</p>",
            "representation": "storage"
        }
    },
    "version": {
        "number": 4,
        "when": "2024-03-05T12:30:00.000Z"
    },
    "_links": {
        "webui": "/pages/viewpage.action?pageId=123456"
    }
}"#;

#[test]
fn client_normalizes_base_url_with_trailing_slash() {
    let client = WikiClient::new(&test_config()).expect("Failed to create client");

    assert_eq!(client.base_url.as_str(), "http://wiki.internal:8090/");
    assert_eq!(client.api_token.as_deref(), Some("secret-token"));
}

#[test]
fn client_preserves_existing_base_path() {
    let config = WikiConfig {
        base_url: "http://wiki.internal:8090/confluence".to_string(),
        ..test_config()
    };
    let client = WikiClient::new(&config).expect("Failed to create client");

    assert_eq!(
        client.base_url.as_str(),
        "http://wiki.internal:8090/confluence/"
    );
}

#[test]
fn invalid_base_url_is_rejected() {
    let config = WikiConfig {
        base_url: "not a url".to_string(),
        ..test_config()
    };

    assert!(WikiClient::new(&config).is_err());
}

#[test]
fn page_response_maps_to_document() {
    let client = WikiClient::new(&test_config()).expect("Failed to create client");
    let page: PageResponse = serde_json::from_str(PAGE_JSON).expect("should parse page JSON");

    let document = client.to_document(page);

    assert_eq!(document.id, "123456");
    assert_eq!(document.title, "Deployment Runbook");
    assert_eq!(
        document.url,
        "http://wiki.internal:8090/pages/viewpage.action?pageId=123456"
    );
    assert_eq!(document.text, "Deployment\n\nRun the deploy script.");
    assert_eq!(
        document.last_modified.to_rfc3339(),
        "2024-03-05T12:30:00+00:00"
    );
}

#[test]
fn page_without_body_maps_to_empty_text() {
    let client = WikiClient::new(&test_config()).expect("Failed to create client");
    let page: PageResponse =
        serde_json::from_str(r#"{"id": "7", "title": "Stub Page"}"#).expect("should parse");

    let document = client.to_document(page);

    assert_eq!(document.id, "7");
    assert!(document.text.is_empty());
    assert_eq!(document.url, "http://wiki.internal:8090/");
    assert_eq!(document.last_modified, DateTime::UNIX_EPOCH);
}

#[test]
fn space_listing_parses_results() {
    let json = format!(r#"{{"results": [{}], "size": 1}}"#, PAGE_JSON);
    let list: PageListResponse = serde_json::from_str(&json).expect("should parse list JSON");

    assert_eq!(list.results.len(), 1);
    assert_eq!(list.results[0].id, "123456");
}

#[test]
fn empty_space_listing_parses_to_no_results() {
    let list: PageListResponse = serde_json::from_str(r#"{"size": 0}"#).expect("should parse");
    assert!(list.results.is_empty());
}
