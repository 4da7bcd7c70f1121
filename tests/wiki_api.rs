//! Integration tests for the query protocol layer and catalog operations
//!
//! Every test runs against an in-process mock wiki so the pagination,
//! WAF-handling and traversal properties are observable: request counts,
//! continuation handling, cycle termination, dedup.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{MockResponse, MockServer};
use serde_json::json;

use wikivoice_core::api::query::NS_CATEGORY;
use wikivoice_core::cancel::CancelToken;
use wikivoice_core::{ClientConfig, NullSink, SessionConfig, WikiClient, WikiSession};

fn test_client(server: &MockServer) -> WikiClient {
    let config = ClientConfig::new(server.endpoint())
        .retry_base_delay(Duration::from_millis(5))
        .retry_jitter(Duration::ZERO);
    WikiClient::new(config).unwrap()
}

#[tokio::test]
async fn test_category_members_follows_continuation_until_absent() {
    let server = MockServer::start(|target| {
        if target.contains("cmcontinue=page2") {
            MockResponse::json(json!({
                "query": {"categorymembers": [
                    {"ns": 14, "title": "Category:C"}
                ]}
            }))
        } else {
            MockResponse::json(json!({
                "query": {"categorymembers": [
                    {"ns": 14, "title": "Category:A"},
                    {"ns": 14, "title": "Category:B"}
                ]},
                "continue": {"cmcontinue": "page2", "continue": "-||"}
            }))
        }
    })
    .await;

    let client = test_client(&server);
    let members = client
        .category_members(
            "Category:Root",
            wikivoice_core::api::MemberKind::Subcategory,
            &CancelToken::new(),
        )
        .await
        .unwrap();

    // Exactly one request per page, items in page order.
    assert_eq!(server.hits(), 2);
    let titles: Vec<&str> = members.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, vec!["Category:A", "Category:B", "Category:C"]);
}

#[tokio::test]
async fn test_search_paginates_by_numeric_offset() {
    let server = MockServer::start(|target| {
        if target.contains("sroffset=100") {
            MockResponse::json(json!({
                "query": {"search": [{"title": "Category:信语音"}]}
            }))
        } else {
            MockResponse::json(json!({
                "query": {"search": [{"title": "Category:香奈美语音"}]},
                "continue": {"sroffset": 100, "continue": "-||"}
            }))
        }
    })
    .await;

    let client = test_client(&server);
    let titles = client
        .search_titles("语音", NS_CATEGORY, 1000, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(server.hits(), 2);
    assert_eq!(titles, vec!["Category:香奈美语音", "Category:信语音"]);
}

#[tokio::test]
async fn test_caller_cap_bounds_pagination() {
    // The server advertises continuations forever; the cap must stop us.
    let server = MockServer::start(|_| {
        let page: Vec<_> = (0..100)
            .map(|i| json!({"title": format!("Category:C{:03}", i)}))
            .collect();
        MockResponse::json(json!({
            "query": {"search": page},
            "continue": {"sroffset": 100, "continue": "-||"}
        }))
    })
    .await;

    let client = test_client(&server);
    let titles = client
        .search_titles("x", NS_CATEGORY, 150, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(titles.len(), 150);
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_html_first_page_is_reported_as_blocked() {
    let server = MockServer::start(|_| MockResponse::html()).await;

    let client = test_client(&server);
    let result = client
        .search_titles("语音", NS_CATEGORY, 1000, &CancelToken::new())
        .await;

    assert!(result.unwrap_err().is_blocked());
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_html_on_later_page_keeps_accumulated_results() {
    let server = MockServer::start(|target| {
        if target.contains("cmcontinue=") {
            MockResponse::html()
        } else {
            MockResponse::json(json!({
                "query": {"categorymembers": [{"ns": 14, "title": "Category:A"}]},
                "continue": {"cmcontinue": "next", "continue": "-||"}
            }))
        }
    })
    .await;

    let client = test_client(&server);
    let members = client
        .category_members(
            "Category:Root",
            wikivoice_core::api::MemberKind::Subcategory,
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(members.len(), 1);
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_malformed_json_first_page_yields_empty_result() {
    let server =
        MockServer::start(|_| MockResponse::bytes(b"{\"query\": oops".to_vec(), "application/json"))
            .await;

    let client = test_client(&server);
    let titles = client
        .search_titles("语音", NS_CATEGORY, 1000, &CancelToken::new())
        .await
        .unwrap();

    assert!(titles.is_empty());
}

#[tokio::test]
async fn test_throttle_status_is_retried_with_backoff() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let handler_attempts = Arc::clone(&attempts);

    let server = MockServer::start(move |_| {
        if handler_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            MockResponse::status(429)
        } else {
            MockResponse::json(json!({
                "query": {"search": [{"title": "Category:信语音"}]}
            }))
        }
    })
    .await;

    let client = test_client(&server);
    let titles = client
        .search_titles("语音", NS_CATEGORY, 1000, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(titles, vec!["Category:信语音"]);
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_scan_category_tree_terminates_on_cycle() {
    // A lists B as a subcategory and B lists A back.
    let server = MockServer::start(|target| {
        if target.contains("cmtitle=Category:A") {
            MockResponse::json(json!({
                "query": {"categorymembers": [{"ns": 14, "title": "Category:B"}]}
            }))
        } else {
            MockResponse::json(json!({
                "query": {"categorymembers": [{"ns": 14, "title": "Category:A"}]}
            }))
        }
    })
    .await;

    let client = test_client(&server);
    let tree = client
        .scan_category_tree("Category:A", &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(tree, vec!["Category:A".to_string(), "Category:B".to_string()]);
    // One members query per category, none repeated.
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_scan_category_tree_root_first_then_sorted() {
    let server = MockServer::start(|target| {
        if target.contains("cmtitle=Category:信语音") && !target.contains("cmtitle=Category:信语音/") {
            MockResponse::json(json!({
                "query": {"categorymembers": [
                    {"ns": 14, "title": "Category:信语音/战斗"},
                    {"ns": 14, "title": "Category:信语音/互动"}
                ]}
            }))
        } else {
            MockResponse::json(json!({"query": {"categorymembers": []}}))
        }
    })
    .await;

    let client = test_client(&server);
    let tree = client
        .scan_category_tree("Category:信语音", &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(
        tree,
        vec![
            "Category:信语音".to_string(),
            "Category:信语音/互动".to_string(),
            "Category:信语音/战斗".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_resolve_category_files_filters_and_strips_prefix() {
    let server = MockServer::start(|_| {
        MockResponse::json(json!({
            "query": {"pages": {
                "1": {"title": "File:信-战斗-01.ogg", "imageinfo": [
                    {"url": "https://cdn.example.org/a/信-战斗-01.ogg", "mime": "audio/ogg"}
                ]},
                "2": {"title": "File:信-立绘.png", "imageinfo": [
                    {"url": "https://cdn.example.org/b/信-立绘.png", "mime": "image/png"}
                ]}
            }}
        }))
    })
    .await;

    let client = test_client(&server);
    let files = client
        .resolve_category_files("Category:信语音", true, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "信-战斗-01.ogg");
    assert_eq!(files[0].url, "https://cdn.example.org/a/信-战斗-01.ogg");
}

#[tokio::test]
async fn test_search_files_merges_strategies_and_dedups_by_name() {
    let server = MockServer::start(|target| {
        if target.contains("list=allimages") {
            MockResponse::json(json!({
                "query": {"allimages": [
                    {"name": "信-a.ogg", "url": "https://cdn.example.org/1/信-a.ogg", "mime": "audio/ogg"}
                ]}
            }))
        } else if target.contains("list=search") {
            MockResponse::json(json!({
                "query": {"search": [
                    {"title": "File:信-a.ogg"},
                    {"title": "File:信-b.ogg"}
                ]}
            }))
        } else {
            // imageinfo lookup for the unresolved title
            MockResponse::json(json!({
                "query": {"pages": {
                    "9": {"title": "File:信-b.ogg", "imageinfo": [
                        {"url": "https://cdn.example.org/2/信-b.ogg", "mime": "audio/ogg"}
                    ]}
                }}
            }))
        }
    })
    .await;

    let client = test_client(&server);
    let files = client
        .search_files("信", true, 1000, &CancelToken::new())
        .await
        .unwrap();

    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["信-a.ogg", "信-b.ogg"]);
}

#[tokio::test]
async fn test_session_retries_blocked_search() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let handler_attempts = Arc::clone(&attempts);

    let server = MockServer::start(move |_| {
        if handler_attempts.fetch_add(1, Ordering::SeqCst) < 2 {
            MockResponse::html()
        } else {
            MockResponse::json(json!({
                "query": {"search": [
                    {"title": "Category:信语音"},
                    {"title": "Category:香奈美语音"}
                ]}
            }))
        }
    })
    .await;

    let config = SessionConfig::new(server.endpoint())
        .blocked_retry_delays(Duration::from_millis(1), Duration::from_millis(2));
    let session = WikiSession::new(config, Arc::new(NullSink)).unwrap();

    let groups = session.search_and_group("语音", true).await.unwrap();

    assert_eq!(server.hits(), 3);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].entity_name, "信");
    assert_eq!(groups[0].root_category, "Category:信语音");
    assert_eq!(groups[0].member_categories.len(), 1);
    assert_eq!(groups[1].entity_name, "香奈美");
    assert_eq!(groups[1].root_category, "Category:香奈美语音");
    assert_eq!(groups[1].member_categories.len(), 1);
}

#[tokio::test]
async fn test_session_tree_scan_is_cached() {
    let server = MockServer::start(|_| {
        MockResponse::json(json!({"query": {"categorymembers": []}}))
    })
    .await;

    let session =
        WikiSession::new(SessionConfig::new(server.endpoint()), Arc::new(NullSink)).unwrap();

    let first = session.scan_category_tree("Category:信语音").await.unwrap();
    let hits_after_first = server.hits();
    let second = session.scan_category_tree("Category:信语音").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.hits(), hits_after_first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_image_cache_coalesces_concurrent_fetches() {
    let server = MockServer::start(|_| {
        MockResponse::bytes(vec![7u8; 64], "image/png").with_delay(Duration::from_millis(50))
    })
    .await;

    let session =
        WikiSession::new(SessionConfig::new(server.endpoint()), Arc::new(NullSink)).unwrap();
    let url = server.url("/images/avatar.png");

    let (a, b) = tokio::join!(session.images().get(&url), session.images().get(&url));
    assert_eq!(*a.unwrap(), vec![7u8; 64]);
    assert_eq!(*b.unwrap(), vec![7u8; 64]);
    // Two concurrent lookups share one network fetch.
    assert_eq!(server.hits(), 1);

    // And a later lookup is served from the LRU.
    let c = session.images().get(&url).await.unwrap();
    assert_eq!(c.len(), 64);
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn test_expand_group_records_full_tree() {
    let server = MockServer::start(|target| {
        if target.contains("cmtitle=Category:信语音") && !target.contains("cmtitle=Category:信语音/") {
            MockResponse::json(json!({
                "query": {"categorymembers": [
                    {"ns": 14, "title": "Category:信语音/战斗"}
                ]}
            }))
        } else {
            MockResponse::json(json!({"query": {"categorymembers": []}}))
        }
    })
    .await;

    let session =
        WikiSession::new(SessionConfig::new(server.endpoint()), Arc::new(NullSink)).unwrap();

    let mut group = wikivoice_core::CharacterGroup {
        entity_name: "信".to_string(),
        root_category: "Category:信语音".to_string(),
        member_categories: vec!["Category:信语音".to_string()],
    };

    session.expand_group(&mut group).await.unwrap();
    assert_eq!(
        group.member_categories,
        vec![
            "Category:信语音".to_string(),
            "Category:信语音/战斗".to_string(),
        ]
    );
}
