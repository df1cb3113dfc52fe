use super::*;
use crate::config::BackendConfig;
use crate::identity::Hs256TokenService;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "sync-test-secret";

struct Harness {
    service: InboxSyncService,
    feed: Arc<ChangeFeed>,
    session: Arc<SessionContext>,
    tokens: Arc<dyn TokenService>,
}

fn ana() -> Identity {
    Identity {
        user_id: "user-1".to_string(),
        username: "ana".to_string(),
    }
}

fn harness(server: &MockServer, poll_ms: u64, feed_enabled: bool) -> Harness {
    let backend = BackendConfig {
        base_url: server.uri(),
        ..BackendConfig::default()
    };
    let client = Arc::new(MessageStoreClient::new(&backend));
    let feed = Arc::new(ChangeFeed::new(&backend));
    let session = Arc::new(SessionContext::in_memory());
    let tokens: Arc<dyn TokenService> =
        Arc::new(Hs256TokenService::new(SECRET, 3600).expect("token service"));
    let service = InboxSyncService::new(
        client,
        feed.clone(),
        session.clone(),
        tokens.clone(),
        Duration::from_millis(poll_ms),
        feed_enabled,
    );
    Harness {
        service,
        feed,
        session,
        tokens,
    }
}

async fn logged_in_harness(server: &MockServer, poll_ms: u64, feed_enabled: bool) -> Harness {
    let h = harness(server, poll_ms, feed_enabled);
    let token = h.tokens.issue(&ana()).await.expect("issue");
    h.session.login(token, ana()).expect("login");
    h
}

fn message_json(sender: &str, recipient: &str, body: &str, at: &str) -> serde_json::Value {
    json!({
        "id": sender,
        "first_name": sender.to_uppercase(),
        "for": recipient,
        "message": body,
        "created_at": at
    })
}

async fn mount_fetch(server: &MockServer, messages: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": messages })))
        .mount(server)
        .await;
}

async fn wait_for_state(
    rx: &mut watch::Receiver<InboxState>,
    predicate: impl FnMut(&InboxState) -> bool,
) -> InboxState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone()
}

#[tokio::test]
async fn test_start_reaches_ready_with_messages() {
    let server = MockServer::start().await;
    mount_fetch(
        &server,
        vec![
            message_json("user-2", "user-1", "hi", "2026-01-10T12:00:00Z"),
            message_json("user-1", "user-2", "yo", "2026-01-10T12:01:00Z"),
        ],
    )
    .await;

    let h = logged_in_harness(&server, 1000, false).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");

    let state = wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;
    assert_eq!(state.messages.len(), 2);
    assert!(state.last_error.is_none());

    h.service.stop().await;
}

#[tokio::test]
async fn test_start_without_token_spawns_nothing() {
    let server = MockServer::start().await;
    let h = harness(&server, 50, true);

    let err = h.service.start().await.unwrap_err();
    assert!(matches!(err, MessagingError::Unauthenticated));
    assert_eq!(h.service.state().view, ViewState::Unauthenticated);
    assert_eq!(h.feed.active_subscriptions(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty(), "no network traffic without a session");
}

#[tokio::test]
async fn test_start_with_invalid_token_goes_unauthenticated() {
    let server = MockServer::start().await;
    let h = harness(&server, 50, true);
    h.session
        .login("not-a-real-token".to_string(), ana())
        .expect("login");

    let err = h.service.start().await.unwrap_err();
    assert!(matches!(err, MessagingError::Unauthenticated));
    assert_eq!(h.service.state().view, ViewState::Unauthenticated);
    assert_eq!(h.feed.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_stop_releases_poll_timer_and_subscription() {
    let server = MockServer::start().await;
    mount_fetch(&server, Vec::new()).await;
    Mock::given(method("GET"))
        .and(path("/api/chat/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("", "text/event-stream"))
        .mount(&server)
        .await;

    let h = logged_in_harness(&server, 100, true).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");
    wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;
    assert_eq!(h.feed.active_subscriptions(), 1);

    h.service.stop().await;
    assert_eq!(h.feed.active_subscriptions(), 0);

    // The poll timer is gone too: request volume stays flat after stop.
    let count_chat_requests = |requests: &[wiremock::Request]| {
        requests
            .iter()
            .filter(|r| r.url.path() == "/api/chat")
            .count()
    };
    let before = count_chat_requests(&server.received_requests().await.unwrap_or_default());
    tokio::time::sleep(Duration::from_millis(400)).await;
    let after = count_chat_requests(&server.received_requests().await.unwrap_or_default());
    assert_eq!(before, after, "poll loop kept fetching after stop");
}

#[tokio::test]
async fn test_stop_is_safe_from_any_state() {
    let server = MockServer::start().await;
    let h = harness(&server, 50, true);
    // Never started.
    h.service.stop().await;
    assert_eq!(h.feed.active_subscriptions(), 0);
    // Twice in a row.
    h.service.stop().await;
}

#[tokio::test]
async fn test_feed_push_merges_into_state() {
    let server = MockServer::start().await;
    mount_fetch(&server, Vec::new()).await;
    let insert = concat!(
        "event: insert\n",
        "data: {\"id\":\"user-2\",\"first_name\":\"Ben\",\"for\":\"user-1\",",
        "\"message\":\"pushed\",\"created_at\":\"2026-01-10T12:00:00Z\"}\n",
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/api/chat/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(insert, "text/event-stream"))
        .mount(&server)
        .await;

    let h = logged_in_harness(&server, 1000, true).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");

    let state = wait_for_state(&mut rx, |s| !s.messages.is_empty()).await;
    assert_eq!(state.messages[0].body, "pushed");

    // Later polls return an empty fetch; the pushed row must survive the merge.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(h.service.state().messages.len(), 1);

    h.service.stop().await;
}

#[tokio::test]
async fn test_open_thread_and_close_thread_transitions() {
    let server = MockServer::start().await;
    mount_fetch(
        &server,
        vec![message_json("user-2", "user-1", "hi", "2026-01-10T12:00:00Z")],
    )
    .await;

    let h = logged_in_harness(&server, 1000, false).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");
    wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;

    h.service.open_thread("user-2").await.expect("open");
    assert_eq!(
        h.service.state().view,
        ViewState::ThreadOpen("user-2".to_string())
    );
    assert_eq!(h.session.partner_id().as_deref(), Some("user-2"));

    h.service.close_thread();
    let state = h.service.state();
    assert_eq!(state.view, ViewState::Ready);
    // View-only transition: the data stays.
    assert_eq!(state.messages.len(), 1);

    h.service.stop().await;
}

#[tokio::test]
async fn test_send_merges_authoritative_thread() {
    let server = MockServer::start().await;
    mount_fetch(&server, Vec::new()).await;
    Mock::given(method("PUT"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [message_json("user-1", "user-2", "hello", "2026-01-10T12:02:00Z")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = logged_in_harness(&server, 1000, false).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");
    wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;

    h.service.open_thread("user-2").await.expect("open");
    h.service.send_message("hello").await.expect("send");

    let state = h.service.state();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].body, "hello");

    h.service.stop().await;
}

#[tokio::test]
async fn test_send_empty_text_is_silent_noop() {
    let server = MockServer::start().await;
    mount_fetch(&server, Vec::new()).await;
    Mock::given(method("PUT"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = logged_in_harness(&server, 1000, false).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");
    wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;

    h.service.open_thread("user-2").await.expect("open");
    h.service.send_message("   ").await.expect("send");
    assert!(h.service.state().messages.is_empty());

    h.service.stop().await;
}

#[tokio::test]
async fn test_send_without_selected_thread_is_noop() {
    let server = MockServer::start().await;
    mount_fetch(&server, Vec::new()).await;
    Mock::given(method("PUT"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = logged_in_harness(&server, 1000, false).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");
    wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;

    h.service.send_message("orphaned").await.expect("send");

    h.service.stop().await;
}

#[tokio::test]
async fn test_send_failure_is_logged_and_state_kept() {
    let server = MockServer::start().await;
    mount_fetch(
        &server,
        vec![message_json("user-2", "user-1", "hi", "2026-01-10T12:00:00Z")],
    )
    .await;
    Mock::given(method("PUT"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = logged_in_harness(&server, 1000, false).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");
    wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;

    h.service.open_thread("user-2").await.expect("open");
    // Failure is swallowed; the caller keeps the draft and retries.
    h.service.send_message("will fail").await.expect("send");

    let state = h.service.state();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].body, "hi");

    h.service.stop().await;
}

#[tokio::test]
async fn test_poll_failure_sets_panel_error_and_keeps_messages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [message_json("user-2", "user-1", "hi", "2026-01-10T12:00:00Z")]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = logged_in_harness(&server, 100, false).await;
    let mut rx = h.service.subscribe_state();
    h.service.start().await.expect("start");

    wait_for_state(&mut rx, |s| s.view == ViewState::Ready).await;
    let state = wait_for_state(&mut rx, |s| s.last_error.is_some()).await;
    assert_eq!(state.messages.len(), 1, "stale data outlives a failed poll");

    h.service.stop().await;
}
