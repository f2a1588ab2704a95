//! End-to-end integration tests over real WebSocket connections.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use marque_core::errors::{RequestError, TransactionError};
use marque_session::registry::HandlerResult;
use marque_session::{
    CLIENT_ERROR, Controller, ControllerConfig, Message, MessageOptions, Session, TypeDefaults,
    UNHANDLED,
};
use marque_ws::ServerConfig;

const TIMEOUT: Duration = Duration::from_secs(5);

type RawStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a server controller and return it with its ws:// URL.
async fn boot_server(config: ControllerConfig) -> (Arc<Controller>, String) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let controller = Controller::new(config);
    let addr = marque_ws::listen(&controller, ServerConfig::default())
        .await
        .expect("bind");
    (controller, format!("ws://{addr}/ws"))
}

/// Fresh client controller with the "ping" request type registered.
fn client_controller() -> Arc<Controller> {
    let controller = Controller::new(ControllerConfig::default());
    let _ = controller.register_message_type(
        "ping",
        TypeDefaults {
            synchronous: true,
            timeout: Some(Duration::from_secs(5)),
        },
        None,
    );
    controller
}

async fn raw_client(url: &str) -> RawStream {
    let (stream, _response) = connect_async(url).await.expect("connect");
    stream
}

async fn next_json(stream: &mut RawStream) -> Value {
    loop {
        let message = timeout(TIMEOUT, stream.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let WsMessage::Text(text) = message {
            return serde_json::from_str(&text).expect("frame is JSON");
        }
    }
}

/// Poll `condition` until it holds or a deadline passes.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within deadline");
}

// ── Request / reply ─────────────────────────────────────────────────

#[tokio::test]
async fn ping_pong_round_trip() {
    let (server, url) = boot_server(ControllerConfig::default()).await;
    server.set_handler(
        "ping",
        |message: Message, session: &Arc<Session>| -> HandlerResult {
            let pong = session
                .message("pong", json!({"echo": message.payload()["n"]}))
                .reply(&message);
            session.send(pong, None)?;
            Ok(())
        },
    );

    let client = client_controller();
    let session = marque_ws::connect(&client, &url).await.expect("connect");

    let reply = timeout(
        TIMEOUT,
        session.request(session.message("ping", json!({"n": 42}))),
    )
    .await
    .expect("timed out")
    .expect("request failed");

    assert_eq!(reply.kind(), "pong");
    assert_eq!(reply.payload()["echo"], 42);
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn concurrent_requests_correlate_independently() {
    let (server, url) = boot_server(ControllerConfig::default()).await;
    server.set_handler(
        "ping",
        |message: Message, session: &Arc<Session>| -> HandlerResult {
            let pong = session
                .message("pong", json!({"echo": message.payload()["n"]}))
                .reply(&message);
            session.send(pong, None)?;
            Ok(())
        },
    );

    let client = client_controller();
    let session = marque_ws::connect(&client, &url).await.expect("connect");

    let first = session.request(session.message("ping", json!({"n": 1})));
    let second = session.request(session.message("ping", json!({"n": 2})));
    let (first, second) = timeout(TIMEOUT, futures::future::join(first, second))
        .await
        .expect("timed out");

    assert_eq!(first.unwrap().payload()["echo"], 1);
    assert_eq!(second.unwrap().payload()["echo"], 2);
}

#[tokio::test]
async fn request_without_reply_times_out() {
    // No handler replies, and unhandled messages surface silently.
    let (_server, url) = boot_server(ControllerConfig::default()).await;

    let client = Controller::new(ControllerConfig::default());
    let session = marque_ws::connect(&client, &url).await.expect("connect");

    let request = session.message_with(
        "void:call",
        json!({}),
        MessageOptions {
            synchronous: Some(true),
            timeout: Some(Duration::from_millis(100)),
            ..MessageOptions::default()
        },
    );
    let err = timeout(TIMEOUT, session.request(request))
        .await
        .expect("timed out")
        .expect_err("request should time out");

    assert_matches!(err, RequestError::Transaction(TransactionError::TimedOut));
    assert_eq!(session.pending_requests(), 0);
}

#[tokio::test]
async fn shutdown_cancels_pending_requests() {
    let (_server, url) = boot_server(ControllerConfig::default()).await;

    let client = Controller::new(ControllerConfig::default());
    let session = marque_ws::connect(&client, &url).await.expect("connect");

    // Synchronous with no reply window: only cancellation can resolve it.
    let request = session.message_with(
        "hold:call",
        json!({}),
        MessageOptions {
            synchronous: Some(true),
            timeout: None,
            ..MessageOptions::default()
        },
    );
    let waiter = tokio::spawn({
        let session = session.clone();
        async move { session.request(request).await }
    });

    let session_probe = session.clone();
    wait_for(move || session_probe.pending_requests() == 1).await;
    session.shutdown().expect("shutdown");

    let err = timeout(TIMEOUT, waiter)
        .await
        .expect("timed out")
        .expect("task panicked")
        .expect_err("request should be canceled");
    assert_matches!(err, RequestError::Transaction(TransactionError::Canceled));
}

// ── Diagnostics ─────────────────────────────────────────────────────

#[tokio::test]
async fn unhandled_message_is_rejected_with_diagnostic() {
    let (_server, url) = boot_server(ControllerConfig {
        reject_unhandled: true,
    })
    .await;

    let mut stream = raw_client(&url).await;
    stream
        .send(WsMessage::Text(
            r#"{"type": "unknown:msg", "metadata": {"id": "X"}}"#.into(),
        ))
        .await
        .expect("send");

    let frame = next_json(&mut stream).await;
    assert_eq!(frame["type"], UNHANDLED);
    assert_eq!(frame["metadata"]["to"], "X");
    assert_eq!(frame["metadata"]["synchronous"], false);
    assert_eq!(frame["metadata"]["timeout"], false);
}

#[tokio::test]
async fn malformed_frame_yields_client_error() {
    let (_server, url) = boot_server(ControllerConfig::default()).await;

    let mut stream = raw_client(&url).await;
    stream
        .send(WsMessage::Text("this is not a frame".into()))
        .await
        .expect("send");

    let frame = next_json(&mut stream).await;
    assert_eq!(frame["type"], CLIENT_ERROR);
    assert_eq!(frame["payload"]["reason"], "malformed message frame");
    assert_eq!(frame["payload"]["original"], "this is not a frame");
    assert!(!frame["payload"]["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_frame_does_not_drop_the_connection() {
    let (server, url) = boot_server(ControllerConfig {
        reject_unhandled: true,
    })
    .await;

    let mut stream = raw_client(&url).await;
    stream
        .send(WsMessage::Text("garbage".into()))
        .await
        .expect("send");
    let first = next_json(&mut stream).await;
    assert_eq!(first["type"], CLIENT_ERROR);

    // The session is still live and dispatching.
    stream
        .send(WsMessage::Text(
            r#"{"type": "still:there", "metadata": {"id": "Y"}}"#.into(),
        ))
        .await
        .expect("send");
    let second = next_json(&mut stream).await;
    assert_eq!(second["type"], UNHANDLED);
    assert_eq!(second["metadata"]["to"], "Y");
    assert_eq!(server.session_count(), 1);
}

#[tokio::test]
async fn binary_frames_are_accepted_as_text() {
    let (_server, url) = boot_server(ControllerConfig {
        reject_unhandled: true,
    })
    .await;

    let mut stream = raw_client(&url).await;
    let payload = br#"{"type": "bin:msg", "metadata": {"id": "B"}}"#.to_vec();
    stream
        .send(WsMessage::Binary(payload.into()))
        .await
        .expect("send");

    let frame = next_json(&mut stream).await;
    assert_eq!(frame["type"], UNHANDLED);
    assert_eq!(frame["metadata"]["to"], "B");
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn inbound_sessions_register_and_clean_up() {
    let (server, url) = boot_server(ControllerConfig::default()).await;
    assert_eq!(server.session_count(), 0);

    let stream = raw_client(&url).await;
    let server_probe = server.clone();
    wait_for(move || server_probe.session_count() == 1).await;

    drop(stream);
    let server_probe = server.clone();
    wait_for(move || server_probe.session_count() == 0).await;
}

#[tokio::test]
async fn outbound_sessions_stay_unregistered() {
    let (server, url) = boot_server(ControllerConfig::default()).await;

    let client = client_controller();
    let session = marque_ws::connect(&client, &url).await.expect("connect");

    let server_probe = server.clone();
    wait_for(move || server_probe.session_count() == 1).await;
    // The dialing side owns its session; its controller table stays empty.
    assert_eq!(client.session_count(), 0);
    assert!(session.is_attached());
    assert!(session.remote().is_some());
}

#[tokio::test]
async fn server_session_observes_fire_and_forget_messages() {
    let (server, url) = boot_server(ControllerConfig::default()).await;

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    server.set_handler("chat:post", move |message: Message, _s: &Arc<Session>| {
        sink.lock().unwrap().push(message.payload()["body"].clone());
        Ok(())
    });

    let client = Controller::new(ControllerConfig::default());
    let session = marque_ws::connect(&client, &url).await.expect("connect");
    session
        .send(session.message("chat:post", json!({"body": "ahoy"})), None)
        .expect("send");

    let probe = received.clone();
    wait_for(move || !probe.lock().unwrap().is_empty()).await;
    assert_eq!(received.lock().unwrap()[0], "ahoy");
}
