//! Confirmation workflow integration tests.
//!
//! Files arriving outside a batch session are held as pending uploads;
//! these tests drive the confirm/reject admin API and the expiry sweep
//! against a wiremock metadata service.

mod common;

use common::{file_event, TestHarness};
use seriesdock::confirm;
use seriesdock::events::CatalogEvent;
use seriesdock::ingest::IngestOutcome;
use seriesdock_common::PendingUploadId;
use seriesdock_db::models::PendingUpload;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_show_name(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 42, "name": "Show Name", "first_air_date": "2020-01-10",
                 "vote_average": 8.1}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tv/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42, "name": "Show Name", "first_air_date": "2020-01-10",
            "vote_average": 8.1
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tv/42/season/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Season Two",
            "episodes": [{"episode_number": 5, "name": "The Fifth", "runtime": 41}]
        })))
        .mount(server)
        .await;
}

/// Run one file through the pipeline with no batch session, returning the
/// held pending upload.
async fn hold_file(harness: &TestHarness, unique: &str) -> PendingUpload {
    let outcome = harness
        .pipeline
        .process_file(file_event(-1001, 11, unique, "Show.Name.S02E05.mkv"))
        .await
        .expect("pipeline failed");
    match outcome {
        IngestOutcome::PendingConfirmation(pending) => pending,
        other => panic!("expected confirmation hold, got {:?}", other),
    }
}

#[tokio::test]
async fn confirm_promotes_held_file_into_catalog() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let (harness, addr) = TestHarness::with_server_and_resolver(&tmdb.uri()).await;
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);

    let held = hold_file(&harness, "uniq-held").await;
    let mut rx = harness.ctx.bus.subscribe();

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .post(format!("http://{addr}/api/admin/pending/{}/confirm", held.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["applied"], true);
    assert_eq!(body["import"], "imported");
    assert_eq!(body["pending"]["state"], "confirmed");

    // The decision went out on the event bus
    let event = rx.recv().await.unwrap();
    match event {
        CatalogEvent::ConfirmationDecided {
            pending_id,
            decision,
            episode_id,
        } => {
            assert_eq!(pending_id, held.id);
            assert_eq!(decision, seriesdock_db::models::PendingState::Confirmed);
            assert!(episode_id.is_some());
        }
        other => panic!("expected decision event, got {:?}", other),
    }

    // The episode landed under series 42, season 2
    let series_list: serde_json::Value = client
        .get(format!("http://{addr}/api/collections/{}/series", collection.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(series_list[0]["tmdb_id"], 42);
}

#[tokio::test]
async fn reject_discards_and_repeat_reject_reports_prior_outcome() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let (harness, addr) = TestHarness::with_server_and_resolver(&tmdb.uri()).await;
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);

    let held = hold_file(&harness, "uniq-rej").await;

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/admin/pending/{}/reject", held.id);

    let first: serde_json::Value = client.post(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(first["applied"], true);
    assert_eq!(first["pending"]["state"], "rejected");

    // Redelivered decision is a no-op that reports the prior state
    let second: serde_json::Value = client.post(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(second["applied"], false);
    assert_eq!(second["pending"]["state"], "rejected");

    let conn = harness.conn();
    let episodes: i64 = conn
        .query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(episodes, 0);
}

#[tokio::test]
async fn confirm_after_reject_reports_prior_outcome() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let (harness, addr) = TestHarness::with_server_and_resolver(&tmdb.uri()).await;
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);

    let held = hold_file(&harness, "uniq-flip").await;

    let client = reqwest::Client::new();
    client
        .post(format!("http://{addr}/api/admin/pending/{}/reject", held.id))
        .send()
        .await
        .unwrap();

    let body: serde_json::Value = client
        .post(format!("http://{addr}/api/admin/pending/{}/confirm", held.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["applied"], false);
    assert_eq!(body["pending"]["state"], "rejected");
    assert_eq!(body["import"], serde_json::Value::Null);
}

#[tokio::test]
async fn confirm_with_collection_override_files_elsewhere() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let (harness, addr) = TestHarness::with_server_and_resolver(&tmdb.uri()).await;
    let home = harness.seed_collection("Home");
    let archive = harness.seed_collection("Archive");
    harness.seed_inbox(-1001, "Drops", home.id);

    let held = hold_file(&harness, "uniq-override").await;

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .post(format!("http://{addr}/api/admin/pending/{}/confirm", held.id))
        .json(&json!({"collection_id": archive.id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["applied"], true);
    assert_eq!(body["import"], "imported");

    let in_archive: serde_json::Value = client
        .get(format!("http://{addr}/api/collections/{}/series", archive.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(in_archive.as_array().unwrap().len(), 1);

    let in_home: serde_json::Value = client
        .get(format!("http://{addr}/api/collections/{}/series", home.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(in_home.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn list_pending_filters_by_state() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let (harness, addr) = TestHarness::with_server_and_resolver(&tmdb.uri()).await;
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);

    let kept = hold_file(&harness, "uniq-kept").await;
    let dropped = hold_file(&harness, "uniq-dropped").await;

    let client = reqwest::Client::new();
    client
        .post(format!("http://{addr}/api/admin/pending/{}/reject", dropped.id))
        .send()
        .await
        .unwrap();

    let open: serde_json::Value = client
        .get(format!("http://{addr}/api/admin/pending"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(open.as_array().unwrap().len(), 1);
    assert_eq!(open[0]["id"], json!(kept.id));

    let rejected: serde_json::Value = client
        .get(format!("http://{addr}/api/admin/pending?state=rejected"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rejected.as_array().unwrap().len(), 1);
    assert_eq!(rejected[0]["id"], json!(dropped.id));

    let resp = client
        .get(format!("http://{addr}/api/admin/pending?state=bogus"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn decision_on_unknown_pending_id_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!(
            "http://{addr}/api/admin/pending/{}/confirm",
            PendingUploadId::new()
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("http://{addr}/api/admin/pending/not-a-uuid/reject"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn sweep_expires_stale_holds_and_late_confirm_is_refused() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let (harness, addr) = TestHarness::with_server_and_resolver(&tmdb.uri()).await;
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);

    let held = hold_file(&harness, "uniq-stale").await;

    // TTL of zero makes every open hold stale immediately
    let mut config = seriesdock::config::ConfirmationConfig::default();
    config.pending_ttl_secs = 0;
    let summary = confirm::sweep_once(&harness.db, &config).unwrap();
    assert_eq!(summary.expired, 1);

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .post(format!("http://{addr}/api/admin/pending/{}/confirm", held.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["applied"], false);
    assert_eq!(body["pending"]["state"], "expired");

    let conn = harness.conn();
    let episodes: i64 = conn
        .query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(episodes, 0);
}
