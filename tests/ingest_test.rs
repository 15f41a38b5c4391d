//! Ingestion integration tests.
//!
//! Drives whole file events through the webhook, queue, and pipeline against
//! a wiremock metadata service, then checks the catalog over the HTTP API
//! and directly in the database.

mod common;

use std::time::Duration;

use common::{file_event, TestHarness};
use seriesdock::events::CatalogEvent;
use seriesdock::ingest::IngestOutcome;
use seriesdock_db::queries::{seasons, series};
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount search, season, and series detail mocks for catalog entry 42.
async fn mount_show_name(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 42, "name": "Show Name", "first_air_date": "2020-01-10",
                 "overview": "A show.", "poster_path": "/sn.jpg", "vote_average": 8.1}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tv/42/season/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Season Two",
            "air_date": "2021-03-01",
            "episodes": [
                {"episode_number": 1, "name": "The First", "runtime": 39},
                {"episode_number": 5, "name": "The Fifth", "runtime": 41}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/tv/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42, "name": "Show Name", "overview": "A show.",
            "first_air_date": "2020-01-10", "vote_average": 8.1
        })))
        .mount(server)
        .await;
}

async fn await_event<F>(rx: &mut broadcast::Receiver<CatalogEvent>, mut pred: F) -> CatalogEvent
where
    F: FnMut(&CatalogEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ---------------------------------------------------------------------------
// Batch import end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_import_builds_catalog_hierarchy() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let (harness, addr) = TestHarness::with_server_and_resolver(&tmdb.uri()).await;
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);

    let client = reqwest::Client::new();

    // Start a batch session over the admin API
    let resp = client
        .post(format!("http://{addr}/api/admin/inboxes/-1001/batch"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let mut rx = harness.ctx.bus.subscribe();

    // Post one file event through the intake webhook
    let resp = client
        .post(format!("http://{addr}/webhook/files"))
        .json(&file_event(-1001, 11, "uniq-s02e05", "Show.Name.S02E05.1080p.mkv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    await_event(&mut rx, |e| matches!(e, CatalogEvent::EpisodeImported { .. })).await;

    // Series filed under the collection
    let series_list: serde_json::Value = client
        .get(format!("http://{addr}/api/collections/{}/series", collection.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(series_list.as_array().unwrap().len(), 1);
    assert_eq!(series_list[0]["tmdb_id"], 42);
    assert_eq!(series_list[0]["name"], "Show Name");
    let series_id = series_list[0]["id"].as_str().unwrap().to_string();

    // Season 2 exists with one counted episode
    let season_list: serde_json::Value = client
        .get(format!("http://{addr}/api/series/{series_id}/seasons"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(season_list.as_array().unwrap().len(), 1);
    assert_eq!(season_list[0]["season_number"], 2);
    assert_eq!(season_list[0]["name"], "Season Two");
    assert_eq!(season_list[0]["episode_count"], 1);
    let season_id = season_list[0]["id"].as_str().unwrap().to_string();

    // Episode 5 carries resolver metadata and the storage reference
    let episode_list: serde_json::Value = client
        .get(format!("http://{addr}/api/seasons/{season_id}/episodes"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(episode_list.as_array().unwrap().len(), 1);
    assert_eq!(episode_list[0]["episode_number"], 5);
    assert_eq!(episode_list[0]["name"], "The Fifth");
    assert_eq!(episode_list[0]["file_unique_id"], "uniq-s02e05");
    assert_eq!(episode_list[0]["original_filename"], "Show.Name.S02E05.1080p.mkv");
}

#[tokio::test]
async fn redelivered_file_is_skipped_as_duplicate() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let harness = TestHarness::with_resolver(&tmdb.uri());
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);
    harness.ctx.sessions.start(-1001, collection.id);

    let event = file_event(-1001, 11, "uniq-again", "Show.Name.S02E05.mkv");
    let first = harness.pipeline.process_file(event.clone()).await.unwrap();
    let second = harness.pipeline.process_file(event).await.unwrap();

    let imported = match first {
        IngestOutcome::ImportedEpisode(episode) => episode,
        other => panic!("expected import, got {:?}", other),
    };
    match second {
        IngestOutcome::Duplicate(episode) => assert_eq!(episode.id, imported.id),
        other => panic!("expected duplicate, got {:?}", other),
    }

    let conn = harness.conn();
    let found = series::get_series_by_tmdb_id(&conn, collection.id, 42)
        .unwrap()
        .expect("series missing");
    let season_list = seasons::list_seasons_for_series(&conn, found.id).unwrap();
    assert_eq!(season_list[0].episode_count, 1);
}

// ---------------------------------------------------------------------------
// Concurrency properties
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redelivery_creates_exactly_one_episode() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let harness = TestHarness::with_file_db(&tmdb.uri());
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);
    harness.ctx.sessions.start(-1001, collection.id);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = harness.pipeline.clone();
        let event = file_event(-1001, 11, "uniq-race", "Show.Name.S02E05.mkv");
        handles.push(tokio::spawn(async move { pipeline.process_file(event).await }));
    }

    let mut imported = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            IngestOutcome::ImportedEpisode(_) => imported += 1,
            IngestOutcome::Duplicate(_) => duplicates += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(imported, 1);
    assert_eq!(duplicates, 7);

    let conn = harness.conn();
    let found = series::get_series_by_tmdb_id(&conn, collection.id, 42)
        .unwrap()
        .expect("series missing");
    let season_list = seasons::list_seasons_for_series(&conn, found.id).unwrap();
    assert_eq!(season_list.len(), 1);
    assert_eq!(season_list[0].episode_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn episode_count_is_exact_under_concurrent_imports() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let harness = TestHarness::with_file_db(&tmdb.uri());
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);
    harness.ctx.sessions.start(-1001, collection.id);

    let mut handles = Vec::new();
    for n in 1..=6 {
        let pipeline = harness.pipeline.clone();
        let event = file_event(
            -1001,
            100 + n,
            &format!("uniq-e{n}"),
            &format!("Show.Name.S02E{n:02}.mkv"),
        );
        handles.push(tokio::spawn(async move { pipeline.process_file(event).await }));
    }
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            IngestOutcome::ImportedEpisode(_) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    let conn = harness.conn();
    let found = series::get_series_by_tmdb_id(&conn, collection.id, 42)
        .unwrap()
        .expect("series missing");
    let season = seasons::get_season_by_number(&conn, found.id, 2)
        .unwrap()
        .expect("season missing");
    assert_eq!(season.episode_count, 6);

    let refreshed = seriesdock_db::queries::collections::get_collection(&conn, collection.id).unwrap();
    assert_eq!(refreshed.series_count, 1);
    assert_eq!(refreshed.total_files, 6);
}

// ---------------------------------------------------------------------------
// Failure modes write nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_match_leaves_catalog_untouched() {
    let tmdb = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&tmdb)
        .await;

    let harness = TestHarness::with_resolver(&tmdb.uri());
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);
    harness.ctx.sessions.start(-1001, collection.id);

    let outcome = harness
        .pipeline
        .process_file(file_event(-1001, 11, "uniq-nm", "Obscure.Show.S01E01.mkv"))
        .await
        .unwrap();
    match outcome {
        IngestOutcome::NoMatch { title } => assert_eq!(title, "Obscure Show"),
        other => panic!("expected no match, got {:?}", other),
    }

    let conn = harness.conn();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
    let pending: i64 = conn
        .query_row("SELECT COUNT(*) FROM pending_uploads", [], |row| row.get(0))
        .unwrap();
    assert_eq!(pending, 0);
}

#[tokio::test]
async fn unparsable_filename_leaves_catalog_untouched() {
    let tmdb = MockServer::start().await;

    let harness = TestHarness::with_resolver(&tmdb.uri());
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);
    harness.ctx.sessions.start(-1001, collection.id);

    let outcome = harness
        .pipeline
        .process_file(file_event(-1001, 11, "uniq-unp", "Holiday.Compilation.mkv"))
        .await
        .unwrap();
    match outcome {
        IngestOutcome::Unparsed { filename } => {
            assert_eq!(filename, "Holiday.Compilation.mkv");
        }
        other => panic!("expected unparsed, got {:?}", other),
    }

    // The resolver was never consulted
    assert!(tmdb.received_requests().await.unwrap().is_empty());

    let conn = harness.conn();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn resolver_outage_reports_failure_and_writes_nothing() {
    let tmdb = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&tmdb)
        .await;

    let harness = TestHarness::with_resolver(&tmdb.uri());
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);
    harness.ctx.sessions.start(-1001, collection.id);

    let outcome = harness
        .pipeline
        .process_file(file_event(-1001, 11, "uniq-out", "Show.Name.S02E05.mkv"))
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::ResolverFailure { .. }));

    let conn = harness.conn();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM series", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

// ---------------------------------------------------------------------------
// Session expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_session_falls_back_to_confirmation() {
    let tmdb = MockServer::start().await;
    mount_show_name(&tmdb).await;

    let mut config = seriesdock::config::Config::default();
    config.resolver.api_key = "test-key".to_string();
    config.resolver.base_url = tmdb.uri();
    config.sessions.ttl_secs = 1;

    let harness = TestHarness::with_config(config);
    let collection = harness.seed_collection("Default");
    harness.seed_inbox(-1001, "Drops", collection.id);
    harness.ctx.sessions.start(-1001, collection.id);

    // Let the inactivity deadline lapse
    tokio::time::sleep(Duration::from_millis(1200)).await;

    let outcome = harness
        .pipeline
        .process_file(file_event(-1001, 11, "uniq-late", "Show.Name.S02E05.mkv"))
        .await
        .unwrap();
    let pending = match outcome {
        IngestOutcome::PendingConfirmation(pending) => pending,
        other => panic!("expected confirmation hold, got {:?}", other),
    };
    assert_eq!(pending.suggested_tmdb_id, Some(42));
    assert_eq!(pending.suggested_season, Some(2));
    assert_eq!(pending.suggested_episode, Some(5));

    // Nothing landed in the catalog
    let conn = harness.conn();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM episodes", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}
