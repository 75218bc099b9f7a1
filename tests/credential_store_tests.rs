mod common;

use atelier::AtelierError;
use atelier::credentials::TokenGrant;
use chrono::{TimeDelta, Utc};
use common::{build_core, create_artist, spawn_mock_provider, test_config};

fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expiry: Utc::now() + TimeDelta::hours(1),
        scope: "calendar.readonly".to_string(),
    }
}

#[tokio::test]
async fn save_then_load_round_trips_the_credential() {
    let (_mock, base) = spawn_mock_provider().await;
    let core = build_core("store-roundtrip", &test_config(&base, Vec::new())).await;
    let artist = create_artist(&core, "Ada").await;

    let generation = core
        .credentials
        .save(artist, grant("access-1", Some("refresh-1")))
        .await
        .expect("save");

    let cred = core
        .credentials
        .load(artist)
        .await
        .expect("load")
        .expect("credential present");
    assert_eq!(cred.artist_id, artist);
    assert_eq!(cred.access_token, "access-1");
    assert_eq!(cred.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(cred.scope, "calendar.readonly");
    assert_eq!(cred.generation, generation);

    let rendered = format!("{cred:?}");
    assert!(!rendered.contains("access-1"));
    assert!(!rendered.contains("refresh-1"));
}

#[tokio::test]
async fn omitted_refresh_token_keeps_the_stored_one() {
    let (_mock, base) = spawn_mock_provider().await;
    let core = build_core("store-keep-refresh", &test_config(&base, Vec::new())).await;
    let artist = create_artist(&core, "Ada").await;

    core.credentials
        .save(artist, grant("access-1", Some("refresh-1")))
        .await
        .expect("first save");
    core.credentials
        .save(artist, grant("access-2", None))
        .await
        .expect("second save");

    let cred = core.credentials.load(artist).await.unwrap().unwrap();
    assert_eq!(cred.access_token, "access-2");
    assert_eq!(cred.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn conditional_save_rejects_a_stale_generation() {
    let (_mock, base) = spawn_mock_provider().await;
    let core = build_core("store-cas", &test_config(&base, Vec::new())).await;
    let artist = create_artist(&core, "Ada").await;

    let first = core
        .credentials
        .save(artist, grant("access-1", Some("refresh-1")))
        .await
        .unwrap();
    let second = core
        .credentials
        .save_if(artist, grant("access-2", None), first)
        .await
        .expect("matching generation lands");
    assert!(second > first);

    let err = core
        .credentials
        .save_if(artist, grant("access-3", None), first)
        .await
        .expect_err("stale generation must not land");
    assert!(matches!(
        err,
        AtelierError::ConcurrencyConflict { artist_id } if artist_id == artist
    ));

    let cred = core.credentials.load(artist).await.unwrap().unwrap();
    assert_eq!(cred.access_token, "access-2");
    assert_eq!(cred.generation, second);
}

#[tokio::test]
async fn conditional_delete_only_removes_the_expected_generation() {
    let (_mock, base) = spawn_mock_provider().await;
    let core = build_core("store-delete-if", &test_config(&base, Vec::new())).await;
    let artist = create_artist(&core, "Ada").await;

    let first = core
        .credentials
        .save(artist, grant("access-1", Some("refresh-1")))
        .await
        .unwrap();
    let second = core
        .credentials
        .save(artist, grant("access-2", None))
        .await
        .unwrap();

    assert!(!core.credentials.delete_if(artist, first).await.unwrap());
    assert!(core.credentials.load(artist).await.unwrap().is_some());

    assert!(core.credentials.delete_if(artist, second).await.unwrap());
    assert!(core.credentials.load(artist).await.unwrap().is_none());
    assert!(!core.credentials.delete(artist).await.unwrap());
}

#[tokio::test]
async fn generation_keeps_rising_across_unlink_and_relink() {
    let (_mock, base) = spawn_mock_provider().await;
    let core = build_core("store-generation", &test_config(&base, Vec::new())).await;
    let artist = create_artist(&core, "Ada").await;

    let before = core
        .credentials
        .save(artist, grant("access-1", Some("refresh-1")))
        .await
        .unwrap();
    assert!(core.credentials.delete(artist).await.unwrap());

    let after = core
        .credentials
        .save(artist, grant("access-2", Some("refresh-2")))
        .await
        .unwrap();
    assert!(
        after > before,
        "a relinked credential must not reuse generation {before}"
    );
    assert!(!core.credentials.delete_if(artist, before).await.unwrap());
}

#[tokio::test]
async fn credentials_are_isolated_per_artist() {
    let (_mock, base) = spawn_mock_provider().await;
    let core = build_core("store-isolation", &test_config(&base, Vec::new())).await;
    let ada = create_artist(&core, "Ada").await;
    let bo = create_artist(&core, "Bo").await;

    core.credentials
        .save(ada, grant("ada-access", Some("ada-refresh")))
        .await
        .unwrap();

    assert!(core.credentials.load(bo).await.unwrap().is_none());
    assert!(!core.credentials.delete(bo).await.unwrap());
    assert!(core.credentials.load(ada).await.unwrap().is_some());
}
