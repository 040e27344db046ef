// Integration tests for the clan log poller against a mock game API.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clan_helper::clan_logs::{ClanLogPoller, FetchReport};
use clan_helper::http::{FetchError, JsonFetcher};
use clan_helper::retry::RetryPolicy;
use common::memory_db;

const FAST: RetryPolicy = RetryPolicy::exponential(3, Duration::from_millis(5), 2);

fn log_body() -> serde_json::Value {
    json!([
        {"clanName": "KlutzCo", "memberUsername": "guildan", "message": "guildan added 5x Gold.", "timestamp": "2025-01-20T15:04:05Z"},
        {"clanName": "KlutzCo", "memberUsername": "yothos", "message": "yothos reached level 90 in Mining", "timestamp": "1737385445000"},
        {"clanName": "KlutzCo", "memberUsername": "moraxam", "message": "no timestamp here"},
    ])
}

async fn mock_logs(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/Clan/logs/clan/KlutzCo"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn url(server: &MockServer) -> String {
    format!("{}/api/Clan/logs/clan/KlutzCo?limit=10", server.uri())
}

#[tokio::test]
async fn test_fetch_stores_new_lines_once() {
    let server = MockServer::start().await;
    mock_logs(&server, log_body()).await;

    let db = memory_db().await;
    let poller = ClanLogPoller::new(db.clone(), JsonFetcher::new(FAST).unwrap(), url(&server));
    let cancel = CancellationToken::new();

    let first = poller.fetch_and_store(&cancel).await.unwrap();
    assert_eq!(
        first,
        FetchReport { fetched: 2, inserted: 2, duplicates: 0, failed: 0 }
    );

    let second = poller.fetch_and_store(&cancel).await.unwrap();
    assert_eq!(
        second,
        FetchReport { fetched: 2, inserted: 0, duplicates: 2, failed: 0 }
    );

    let unsent = db.get_unsent_records(10).await.unwrap();
    assert_eq!(unsent.len(), 2);
    assert_eq!(unsent[0].member_name, "guildan");
    assert_eq!(unsent[0].channel_name, "testing-ground");
    assert!(!unsent[0].sent);
}

#[tokio::test]
async fn test_relayed_lines_are_not_stored_again() {
    let server = MockServer::start().await;
    mock_logs(&server, log_body()).await;

    let db = memory_db().await;
    let poller = ClanLogPoller::new(db.clone(), JsonFetcher::new(FAST).unwrap(), url(&server));
    let cancel = CancellationToken::new();

    poller.fetch_and_store(&cancel).await.unwrap();
    let ids: Vec<i64> = db.get_unsent_records(10).await.unwrap().iter().map(|r| r.id).collect();
    db.mark_sent(&ids).await.unwrap();

    let report = poller.fetch_and_store(&cancel).await.unwrap();
    assert_eq!(report.inserted, 0);
    assert!(db.get_unsent_records(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upstream_failure_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let db = memory_db().await;
    let poller = ClanLogPoller::new(db.clone(), JsonFetcher::new(FAST).unwrap(), url(&server));

    let result = poller.fetch_and_store(&CancellationToken::new()).await;

    assert!(matches!(result, Err(FetchError::GaveUp { attempts: 3, .. })));
    assert!(db.get_unsent_records(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_stops_when_cancelled() {
    let server = MockServer::start().await;
    mock_logs(&server, log_body()).await;

    let db = memory_db().await;
    let poller = ClanLogPoller::new(db.clone(), JsonFetcher::new(FAST).unwrap(), url(&server));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(poller.run(Duration::from_secs(3600), cancel.clone()));

    // The first tick runs immediately.
    for _ in 0..50 {
        if db.get_unsent_records(10).await.unwrap().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(db.get_unsent_records(10).await.unwrap().len(), 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("poller did not stop")
        .unwrap();
}
