//! End-to-end session flows against the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lifequest_core::{ChatMessage, Identity, NoticeLevel, RoomId, StateDefaults};
use lifequest_sync::{
    AppContext, BackendError, CollectionPath, DocumentStore, ManagerConfig, MemoryAuth,
    MemoryStore, Notifier, RecordingNotifier, Resource, SessionManager, SlotState, SyncError,
    WriteData,
};
use parking_lot::Mutex;
use serde_json::json;

struct Harness {
    store: MemoryStore,
    auth: MemoryAuth,
    context: Arc<AppContext>,
    notices: Arc<RecordingNotifier>,
    renders: Arc<AtomicUsize>,
    manager: SessionManager,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let auth = MemoryAuth::new().with_popup_identity(
        Identity::new("u1")
            .with_display_name("Ana")
            .with_email("ana@example.com"),
    );
    let renders = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&renders);
    let context = Arc::new(
        AppContext::with_defaults(&StateDefaults::default()).with_render_hook(Arc::new(
            move || {
                let _ = r.fetch_add(1, Ordering::SeqCst);
            },
        )),
    );
    let notices = Arc::new(RecordingNotifier::new());
    let manager = SessionManager::new(
        Arc::new(store.clone()),
        Arc::new(auth.clone()),
        Arc::clone(&context),
        Arc::clone(&notices) as Arc<dyn Notifier>,
        ManagerConfig::default(),
    );
    manager.attach();
    Harness {
        store,
        auth,
        context,
        notices,
        renders,
        manager,
    }
}

async fn signed_in() -> Harness {
    let h = harness();
    let _ = h.manager.sign_in().await.unwrap();
    let _ = h.manager.process_pending().await;
    h
}

fn messages(room: &str) -> CollectionPath {
    CollectionPath::root("chats").doc(room).collection("messages")
}

fn chat_targets(h: &Harness) -> Vec<String> {
    h.store
        .active_targets()
        .into_iter()
        .filter(|t| t.starts_with("chats/"))
        .collect()
}

#[tokio::test]
async fn switching_rooms_keeps_one_chat_listener() {
    let h = signed_in().await;

    h.manager
        .open_chat_room(&RoomId::from("global"), |_| {})
        .unwrap();
    h.manager
        .open_chat_room(&RoomId::from("guild"), |_| {})
        .unwrap();

    assert_eq!(chat_targets(&h), vec!["chats/guild/messages".to_string()]);
    assert_eq!(
        h.manager.slot_state(Resource::ChatRoom),
        SlotState::Bound {
            binding: 2,
            target: "chats/guild/messages".into()
        }
    );
}

#[tokio::test]
async fn reopening_same_room_does_not_duplicate() {
    let h = signed_in().await;
    let room = RoomId::from("global");
    h.manager.open_chat_room(&room, |_| {}).unwrap();
    h.manager.open_chat_room(&room, |_| {}).unwrap();
    assert_eq!(chat_targets(&h).len(), 1);
}

#[tokio::test]
async fn sign_out_cancels_user_listener_and_keeps_state() {
    let h = signed_in().await;
    h.context.update(|s| s.set("xp", 42));
    let before = h.context.state();
    assert!(h.store.active_targets().contains(&"users/u1".to_string()));

    h.manager.sign_out().await.unwrap();
    assert_eq!(h.manager.process_pending().await, 1);

    assert!(!h.store.active_targets().contains(&"users/u1".to_string()));
    assert_eq!(h.manager.slot_state(Resource::User), SlotState::Unbound);
    assert_eq!(h.context.state(), before);
    assert!(h.manager.current_identity().is_none());
}

#[tokio::test]
async fn sign_out_still_renders() {
    let h = signed_in().await;
    let before = h.renders.load(Ordering::SeqCst);
    h.manager.sign_out().await.unwrap();
    let _ = h.manager.process_pending().await;
    assert_eq!(h.renders.load(Ordering::SeqCst), before + 1);
}

#[tokio::test]
async fn blank_messages_never_reach_the_backend() {
    let h = signed_in().await;
    let writes = h.store.write_count();
    let listeners = h.store.listener_count();

    for text in ["", "   ", "\n\t"] {
        let err = h
            .manager
            .send_message(&RoomId::from("global"), text)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::EmptyMessage));
        assert_eq!(h.notices.last().unwrap().message, "Type a message first.");
    }

    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.store.listener_count(), listeners);
    assert_eq!(h.store.collection_len(&messages("global")), 0);
}

#[tokio::test]
async fn sending_without_session_warns() {
    let h = harness();
    let _ = h.manager.process_pending().await;

    let err = h
        .manager
        .send_message(&RoomId::from("global"), "hello")
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NotSignedIn));
    assert_eq!(h.store.write_count(), 0);
    let notice = h.notices.last().unwrap();
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(notice.message, "Sign in to send messages.");
}

#[tokio::test]
async fn save_progress_coerces_numeric_strings() {
    let h = signed_in().await;
    h.context.update(|s| {
        s.set("level", "3");
        s.set("xp", 50);
    });
    let identity = h.manager.current_identity();

    h.manager.save_progress(identity.as_ref()).await.unwrap();

    let record = h
        .store
        .document(&CollectionPath::root("users").doc("u1"))
        .unwrap();
    assert_eq!(record["level"], json!(3));
    assert!(record["level"].is_number());
    assert_eq!(record["xp"], json!(50));
    assert_eq!(record["gold"], json!(0));
}

#[tokio::test]
async fn save_progress_without_identity_is_noop() {
    let h = harness();
    h.manager.save_progress(None).await.unwrap();
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn chat_list_is_sorted_and_grows() {
    let h = signed_in().await;
    let lists: Arc<Mutex<Vec<Vec<ChatMessage>>>> = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&lists);
    let room = RoomId::from("global");
    h.manager
        .open_chat_room(&room, move |list| l.lock().push(list))
        .unwrap();

    for text in ["one", "two", "three"] {
        let _ = h.manager.send_message(&room, text).await.unwrap();
    }

    let lists = lists.lock();
    let lens: Vec<usize> = lists.iter().map(Vec::len).collect();
    assert_eq!(lens, vec![0, 1, 2, 3]);

    let last = lists.last().unwrap();
    let texts: Vec<&str> = last.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
    assert!(last.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert_eq!(last[0].display_name(), "Ana");
}

#[tokio::test]
async fn pushed_user_document_updates_state_and_renders() {
    let h = signed_in().await;
    let renders = h.renders.load(Ordering::SeqCst);
    h.context.update(|s| s.set("theme", "dark"));

    // Another device writes progress as strings.
    h.store
        .set_merge(
            &CollectionPath::root("users").doc("u1"),
            WriteData::new().set("level", "4").set("gold", 25),
        )
        .await
        .unwrap();

    let state = h.context.state();
    assert_eq!(state.get("level"), Some(&json!(4)));
    assert_eq!(state.get("gold"), Some(&json!(25)));
    assert_eq!(state.get("theme"), Some(&json!("dark")));
    assert_eq!(h.renders.load(Ordering::SeqCst), renders + 1);
}

#[tokio::test]
async fn user_listener_failure_keeps_session() {
    let h = signed_in().await;
    let _ = h.store.emit_listener_error(
        "users/u1",
        &BackendError::PermissionDenied("rules changed".into()),
    );
    let _ = h.manager.process_pending().await;

    assert_eq!(h.manager.slot_state(Resource::User), SlotState::Unbound);
    assert!(h.manager.current_identity().is_some());
    assert!(h.notices.notices().is_empty());
}

#[tokio::test]
async fn communities_create_join_and_list() {
    let h = signed_in().await;
    let names: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let n = Arc::clone(&names);
    h.manager
        .listen_communities(move |list| {
            *n.lock() = list.into_iter().map(|c| c.name).collect();
        })
        .unwrap();

    let id = h.manager.create_community("Night Owls!").await.unwrap();
    assert_eq!(id.as_str(), "night-owls-");
    let _ = h.manager.create_community("Alpha").await.unwrap();
    h.manager.join_community(&id).await.unwrap();

    assert_eq!(*names.lock(), vec!["Alpha".to_string(), "Night Owls!".to_string()]);
    let doc = h
        .store
        .document(&CollectionPath::root("communities").doc("night-owls-"))
        .unwrap();
    assert_eq!(doc["members"], json!(["u1"]));

    let messages: Vec<String> = h.notices.notices().into_iter().map(|n| n.message).collect();
    assert_eq!(
        messages,
        vec![
            "Community created: night-owls-",
            "Community created: alpha",
            "Joined: night-owls-",
        ]
    );
}

#[tokio::test]
async fn joining_missing_community_reports_error() {
    let h = signed_in().await;
    let err = h
        .manager
        .join_community(&"ghost".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Backend(BackendError::NotFound(_))));
    assert_eq!(h.notices.last().unwrap().level, NoticeLevel::Error);
}

#[tokio::test]
async fn blank_community_name_is_rejected() {
    let h = signed_in().await;
    let writes = h.store.write_count();
    let err = h.manager.create_community("   ").await.unwrap_err();
    assert!(matches!(err, SyncError::EmptyCommunityName));
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(h.notices.last().unwrap().message, "Enter a name");
}

#[tokio::test]
async fn profile_picture_flow() {
    let h = harness();
    let _ = h.manager.process_pending().await;
    assert!(matches!(
        h.manager.save_profile_picture("data:image/png;base64,AAAA").await,
        Err(SyncError::NotSignedIn)
    ));
    assert_eq!(
        h.notices.last().unwrap().message,
        "Sign in to save your picture."
    );

    let _ = h.manager.sign_in().await.unwrap();
    let _ = h.manager.process_pending().await;
    h.manager
        .save_profile_picture("data:image/png;base64,AAAA")
        .await
        .unwrap();

    assert_eq!(h.notices.last().unwrap().message, "Profile picture saved.");
    assert_eq!(
        h.context.state().profile_picture(),
        Some("data:image/png;base64,AAAA")
    );

    h.store
        .fail_next_write(BackendError::Unavailable("offline".into()));
    assert!(h.manager.save_profile_picture("x").await.is_err());
    assert_eq!(h.notices.last().unwrap().message, "Error saving image");
}

#[tokio::test]
async fn close_chat_room_releases_listener() {
    let h = signed_in().await;
    h.manager
        .open_chat_room(&RoomId::from("global"), |_| {})
        .unwrap();
    assert!(h.manager.close_chat_room());
    assert!(!h.manager.close_chat_room());
    assert!(chat_targets(&h).is_empty());
    assert!(h.manager.current_room().is_none());
}

#[tokio::test]
async fn shutdown_releases_everything() {
    let h = signed_in().await;
    h.manager
        .open_chat_room(&RoomId::from("global"), |_| {})
        .unwrap();
    h.manager.listen_communities(|_| {}).unwrap();
    assert_eq!(h.store.listener_count(), 3);

    h.manager.shutdown();

    assert_eq!(h.store.listener_count(), 0);
    assert_eq!(h.auth.observer_count(), 0);
}
