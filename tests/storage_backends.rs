mod common;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use careerhub_lib::application::ports::StoreScope;
use careerhub_lib::domain::constants::{NOTIFICATIONS_KEY, USER_PREFERENCES_KEY};
use careerhub_lib::{AppConfig, AppState};

use common::test_config;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Preferences {
    theme: String,
    job_alerts: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Notification {
    id: String,
    read: bool,
}

fn disk_config(dir: &TempDir) -> AppConfig {
    let mut config = test_config();
    config.storage.data_dir = dir.path().to_string_lossy().into_owned();
    config.storage.collections_url =
        format!("sqlite://{}", dir.path().join("collections.db").display());
    config
}

#[tokio::test]
async fn durable_values_and_collections_survive_restart() {
    let dir = TempDir::new().expect("temp dir");

    {
        let state = AppState::new(disk_config(&dir)).await.expect("state");
        assert!(
            state
                .storage
                .update(StoreScope::Durable, USER_PREFERENCES_KEY, |prefs: &mut Preferences| {
                    prefs.theme = "dark".to_string();
                    prefs.job_alerts = true;
                })
                .await
        );
        assert!(state.storage.set(StoreScope::Session, "draft", &"cover letter").await);
        for id in ["n1", "n2"] {
            let notification = Notification {
                id: id.to_string(),
                read: false,
            };
            assert!(state.storage.put_object(NOTIFICATIONS_KEY, id, &notification).await);
        }
        state.shutdown().await;
    }

    let state = AppState::new(disk_config(&dir)).await.expect("restarted state");
    let prefs: Preferences = state
        .storage
        .get(StoreScope::Durable, USER_PREFERENCES_KEY)
        .await
        .expect("preferences");
    assert_eq!(prefs.theme, "dark");
    assert!(prefs.job_alerts);
    assert_eq!(state.storage.get::<String>(StoreScope::Session, "draft").await, None);

    let notifications: Vec<Notification> = state.storage.list_objects(NOTIFICATIONS_KEY).await;
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].id, "n1");
    assert!(dir.path().join("local_storage.json").exists());
}

#[tokio::test]
async fn unreadable_durable_file_does_not_block_startup() {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("local_storage.json"), b"{not json").expect("write");

    let state = AppState::new(disk_config(&dir)).await.expect("state");
    assert_eq!(
        state
            .storage
            .get::<Preferences>(StoreScope::Durable, USER_PREFERENCES_KEY)
            .await,
        None
    );
    assert!(
        state
            .storage
            .set(StoreScope::Durable, USER_PREFERENCES_KEY, &Preferences::default())
            .await
    );
    assert!(dir.path().join("local_storage.json.corrupt").exists());
    state.shutdown().await;
}

#[tokio::test]
async fn find_prefers_durable_scope() {
    let app = common::build_app(test_config(), std::time::Duration::ZERO);
    let storage = &app.state.storage;

    assert!(storage.set(StoreScope::Session, "guest-session", &1).await);
    assert_eq!(storage.find::<i32>("guest-session").await, Some((StoreScope::Session, 1)));

    assert!(storage.set(StoreScope::Durable, "guest-session", &2).await);
    assert_eq!(storage.find::<i32>("guest-session").await, Some((StoreScope::Durable, 2)));

    assert!(storage.remove_everywhere("guest-session").await);
    assert_eq!(storage.find::<i32>("guest-session").await, None);
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let mut config = test_config();
    config.api.base_url = "  ".to_string();

    let err = AppState::new(config).await.err().expect("invalid config");
    assert!(err.to_string().contains("invalid configuration"));
}
