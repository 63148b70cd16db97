//! Integration tests for [`telebot_client::TelegramClient`] against a mocked Bot API.
//!
//! Covers: bootstrap offset, polling and offset advance, API error classification, safe mode,
//! per-user draining, the background daemon, and the client as a `wait_for` source.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};
use telebot_client::{TelegramClient, TelegramConfig};
use telebot_core::{ApiErrorKind, Content, TelebotError, UpdateSource};
use telebot_wait::{wait_for, Condition, Filter};

const TOKEN: &str = "1234567890:ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghi";

fn path(method: &str) -> String {
    format!("/bot{}/{}", TOKEN, method)
}

fn text_update(id: i64, user: i64, text: &str) -> Value {
    json!({
        "update_id": id,
        "message": {
            "message_id": id * 10,
            "from": {"id": user, "is_bot": false, "first_name": "U"},
            "chat": {"id": user, "type": "private"},
            "text": text
        }
    })
}

fn ok(result: Value) -> String {
    json!({"ok": true, "result": result}).to_string()
}

async fn mock_updates(server: &mut ServerGuard, offset: i64, result: Value) -> mockito::Mock {
    server
        .mock("POST", path("getUpdates").as_str())
        .match_body(Matcher::PartialJson(json!({ "offset": offset })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ok(result))
        .create_async()
        .await
}

fn client_for(server: &ServerGuard, safe_mode: bool) -> TelegramClient {
    let mut config = TelegramConfig::with_token(TOKEN.to_string());
    config.api_url = server.url();
    config.safe_mode = safe_mode;
    config.poll_interval = Duration::from_millis(50);
    TelegramClient::new(&config).unwrap()
}

/// **Test: Bootstrap positions the offset; poll queues updates and advances it.**
///
/// **Setup:** offset 0 returns update 5; offset 5 returns updates 5 and 6; offset 7 returns none.
/// **Expected:** first poll queues 2 and sets news; second poll queues 0.
#[tokio::test]
async fn test_bootstrap_and_poll() {
    let mut server = Server::new_async().await;
    let _boot = mock_updates(&mut server, 0, json!([text_update(5, 1, "hi")])).await;
    let first = mock_updates(
        &mut server,
        5,
        json!([text_update(5, 1, "hi"), text_update(6, 2, "bye")]),
    )
    .await;
    let second = mock_updates(&mut server, 7, json!([])).await;

    let client = client_for(&server, false);
    assert!(matches!(client.poll().await, Err(TelebotError::NotBootstrapped)));

    client.bootstrap().await.unwrap();
    assert!(!client.has_updates().unwrap());

    assert_eq!(client.poll().await.unwrap(), 2);
    assert!(client.news().unwrap());
    assert!(!client.news().unwrap());
    assert_eq!(client.poll().await.unwrap(), 0);

    first.assert_async().await;
    second.assert_async().await;

    let from_two = client.take_updates_from(2).unwrap();
    assert_eq!(from_two.len(), 1);
    assert_eq!(from_two[0].id, 6);
    let rest = client.take_updates().unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].content.text().unwrap(), "hi");
}

/// **Test: `ok: false` is classified into an API error kind.**
#[tokio::test]
async fn test_api_error_is_classified() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", path("getUpdates").as_str())
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"ok": false, "error_code": 429, "description": "Too Many Requests: retry after 3"})
                .to_string(),
        )
        .create_async()
        .await;

    let client = client_for(&server, false);
    match client.bootstrap().await {
        Err(TelebotError::Api(err)) => {
            assert_eq!(err.code, Some(429));
            assert_eq!(err.method, "getUpdates");
            assert_eq!(err.kind, ApiErrorKind::TooManyRequests { retry_after: Some(3) });
        }
        other => panic!("expected API error, got {:?}", other),
    }
    assert!(!client.is_bootstrapped());
}

/// **Test: Undecodable updates are skipped in safe mode and fail the poll otherwise; the offset moves past them either way.**
#[tokio::test]
async fn test_undecodable_updates() {
    for safe_mode in [true, false] {
        let mut server = Server::new_async().await;
        let _boot = mock_updates(&mut server, 0, json!([text_update(1, 1, "a")])).await;
        let _bad = mock_updates(
            &mut server,
            1,
            json!([text_update(1, 1, "a"), {"update_id": 2, "poll": {}}, text_update(3, 1, "c")]),
        )
        .await;
        let after = mock_updates(&mut server, 4, json!([])).await;
        let retry = mock_updates(&mut server, 3, json!([text_update(3, 1, "c")])).await;

        let client = client_for(&server, safe_mode);
        client.bootstrap().await.unwrap();
        let polled = client.poll().await;

        if safe_mode {
            assert_eq!(polled.unwrap(), 2);
            assert_eq!(client.poll().await.unwrap(), 0);
            after.assert_async().await;
        } else {
            assert!(matches!(polled, Err(TelebotError::UnrecognizedUpdate(2))));
            assert_eq!(client.pending_count(), 1);
            assert_eq!(client.poll().await.unwrap(), 1);
            retry.assert_async().await;
        }
    }
}

/// **Test: The daemon fills the queue and `wait_for` consumes it.**
#[tokio::test]
async fn test_daemon_feeds_wait_for() {
    let mut server = Server::new_async().await;
    let _boot = mock_updates(&mut server, 0, json!([text_update(1, 9, "hello")])).await;
    let _updates = mock_updates(
        &mut server,
        1,
        json!([text_update(1, 9, "hello"), text_update(2, 9, "/stop")]),
    )
    .await;
    let _idle = mock_updates(&mut server, 3, json!([])).await;

    let client = Arc::new(client_for(&server, false));
    client.bootstrap().await.unwrap();
    client.start_daemon().unwrap();
    assert!(client.daemon_running());

    let conditions = vec![Condition::new([Filter::fallible(|c: &Content| {
        Ok(c.text()?.starts_with('/'))
    })])
    .stop_with_fn(|c: &Content| c.chat().map(|chat| chat.id).unwrap_or_default())];

    let outcome = wait_for(client.as_ref(), &conditions, Some(Duration::from_secs(5)), None)
        .await
        .unwrap();
    assert_eq!(outcome, Some(9));
    assert_eq!(client.poll_interval(), telebot_wait::SOURCE_POLL_INTERVAL);

    client.stop_daemon().await;
    assert!(!client.daemon_running());
}
