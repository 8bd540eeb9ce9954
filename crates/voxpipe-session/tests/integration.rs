//! Session tests against an in-process WebSocket recognition server.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use voxpipe_core::{RecognitionConfig, SessionError};
use voxpipe_session::{api_key_provider, RecognitionSession, SessionEvent};

async fn bind() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (url, listener)
}

/// Accepts one connection and records every data message until the client
/// closes.
fn spawn_recording_server(
    listener: TcpListener,
) -> tokio::task::JoinHandle<Vec<Message>> {
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut messages = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => messages.push(msg),
                _ => {}
            }
        }
        messages
    })
}

#[tokio::test]
async fn test_config_sent_first_then_audio_chunks_in_order() {
    let (url, listener) = bind().await;
    let server = spawn_recording_server(listener);

    let session = RecognitionSession::open(
        &url,
        RecognitionConfig::linear16("ko-KR"),
        api_key_provider("test-key"),
    )
    .await
    .unwrap();

    for base in [1u8, 2, 3] {
        session.send_audio(vec![base; 320]).unwrap();
    }
    session.shutdown().await;

    let messages = server.await.unwrap();
    assert_eq!(messages.len(), 4);

    // Exactly one config message, before any audio
    let config_json = match &messages[0] {
        Message::Text(text) => serde_json::from_str::<serde_json::Value>(text).unwrap(),
        other => panic!("first message must be the config, got {other:?}"),
    };
    let config = &config_json["streamingConfig"]["config"];
    assert_eq!(config["encoding"], "LINEAR16");
    assert_eq!(config["sampleRateHertz"], 16_000);
    assert_eq!(config["languageCode"], "ko-KR");

    for (i, base) in [1u8, 2, 3].iter().enumerate() {
        match &messages[i + 1] {
            Message::Binary(bytes) => {
                assert_eq!(bytes.len(), 320);
                assert!(bytes.iter().all(|b| b == base), "chunk {i} out of order");
            }
            other => panic!("expected binary audio chunk, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_api_key_attached_to_handshake() {
    let (url, listener) = bind().await;
    let (key_tx, mut key_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, resp: Response| {
            let key = req
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            let _ = key_tx.send(key);
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    let session = RecognitionSession::open(
        &url,
        RecognitionConfig::linear16("en-US"),
        api_key_provider("secret-abc"),
    )
    .await
    .unwrap();

    assert_eq!(key_rx.recv().await.unwrap(), Some("secret-abc".to_string()));
    session.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_results_delivered_in_receipt_order() {
    let (url, listener) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Consume the config message first
        let _ = ws.next().await;
        for (text, second) in [("R1", "r1"), ("R2", "r2"), ("R3", "r3")] {
            let body = format!(
                r#"{{"results":[{{"alternatives":[{{"transcript":"{text}","confidence":0.9}},{{"transcript":"{second}","confidence":0.1}}],"isFinal":true}}]}}"#
            );
            ws.send(Message::Text(body)).await.unwrap();
        }
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    let mut session = RecognitionSession::open(
        &url,
        RecognitionConfig::linear16("ko-KR"),
        api_key_provider("k"),
    )
    .await
    .unwrap();
    let mut events = session.take_event_receiver().unwrap();

    for expected in ["R1", "R2", "R3"] {
        match events.recv().await.unwrap() {
            SessionEvent::Result(result) => {
                assert_eq!(result.transcript, expected);
                assert!(result.is_final);
            }
            other => panic!("expected result, got {other:?}"),
        }
    }

    session.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_credential_failure_is_auth_error() {
    // Provider failure must surface before any connection attempt; the
    // endpoint is intentionally unreachable.
    let result = RecognitionSession::open(
        "ws://127.0.0.1:9",
        RecognitionConfig::linear16("ko-KR"),
        api_key_provider(""),
    )
    .await;
    assert!(matches!(result, Err(SessionError::Auth(_))));
}

#[tokio::test]
async fn test_unusable_header_value_is_auth_error() {
    let result = RecognitionSession::open(
        "ws://127.0.0.1:9",
        RecognitionConfig::linear16("ko-KR"),
        api_key_provider("bad\nkey"),
    )
    .await;
    assert!(matches!(result, Err(SessionError::Auth(_))));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connect_error() {
    let result = RecognitionSession::open(
        "ws://127.0.0.1:1",
        RecognitionConfig::linear16("ko-KR"),
        api_key_provider("k"),
    )
    .await;
    assert!(matches!(result, Err(SessionError::Connect(_))));
}

#[tokio::test]
async fn test_send_audio_after_close_fails() {
    let (url, listener) = bind().await;
    let server = spawn_recording_server(listener);

    let session = RecognitionSession::open(
        &url,
        RecognitionConfig::linear16("ko-KR"),
        api_key_provider("k"),
    )
    .await
    .unwrap();

    session.close();
    assert!(session.is_closed());
    assert!(matches!(
        session.send_audio(vec![0; 320]),
        Err(SessionError::Closed)
    ));
    // close() again is a no-op
    session.close();
    session.shutdown().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_close_emits_closed_event() {
    let (url, listener) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _ = ws.next().await; // config
        ws.close(None).await.unwrap();
    });

    let mut session = RecognitionSession::open(
        &url,
        RecognitionConfig::linear16("ko-KR"),
        api_key_provider("k"),
    )
    .await
    .unwrap();
    let mut events = session.take_event_receiver().unwrap();

    match events.recv().await.unwrap() {
        SessionEvent::Closed => {}
        other => panic!("expected Closed, got {other:?}"),
    }
    assert!(session.is_closed());
    assert!(matches!(
        session.send_audio(vec![0; 320]),
        Err(SessionError::Closed)
    ));

    session.shutdown().await;
    server.await.unwrap();
}
