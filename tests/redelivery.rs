//! Outbound transmission and durable redelivery against mock backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde_json::json;

use ingress_gateway::resilience::{RetryRecord, ALL_RECORDS};
use ingress_gateway::{Gateway, Transmission, TransmitOptions};

mod common;

fn outbound_config(endpoint: &str, dir: &std::path::Path) -> ingress_gateway::GatewayConfig {
    common::config_with_retry_dir(
        &format!(
            r#"
            [retries]
            interval_secs = 3600

            [[sources]]
            name = "out"
            enable_processing = false
            endpoint = "{endpoint}"
            "#
        ),
        dir,
    )
}

#[tokio::test]
async fn test_failed_transmission_is_persisted_and_redelivered() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let (backend, mut captured) = common::start_programmable_backend("127.0.0.1:0".parse().unwrap(), move || {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (500, "Internal Server Error".into())
            } else {
                (200, "Success".into())
            }
        }
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let config = outbound_config(&format!("http://user:pa%20ss@{backend}/hooks"), dir.path());
    let gateway = Gateway::builder(config).start().await.unwrap();
    assert!(gateway.local_addr("out").is_none());

    let transmitter = gateway.transmitter("out").unwrap();
    let result = transmitter
        .transmit(&json!({"id": "order-1", "total": 12}), TransmitOptions::default())
        .unwrap();
    assert_eq!(result, Transmission::Dispatched { message_id: "order-1".into() });

    let first = captured.recv().await.unwrap();
    assert_eq!(first.method, "POST");
    assert_eq!(first.path, "/hooks");
    assert_eq!(first.body, r#"{"id":"order-1","total":12}"#);
    let expected = format!("Basic {}", base64::engine::general_purpose::STANDARD.encode("user:pa ss"));
    assert_eq!(first.authorization.as_deref(), Some(expected.as_str()));

    let retry = transmitter.retry().clone();
    let path = retry.record_path("order-1");
    assert!(common::eventually(|| path.exists()).await);

    let record: RetryRecord = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(record.url, format!("http://user:pa%20ss@{backend}/hooks"));

    for _ in 0..50 {
        retry.attempt_redelivery(ALL_RECORDS).await;
        if !path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!path.exists());
    assert!(calls.load(Ordering::SeqCst) >= 3);
    assert!(retry.pending().unwrap().is_empty());

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_leftover_records_are_swept_at_startup() {
    let (backend, mut captured) =
        common::start_programmable_backend("127.0.0.1:0".parse().unwrap(), || async { (204, String::new()) }).await;

    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("out");
    std::fs::create_dir_all(&store).unwrap();
    let record = RetryRecord {
        message_id: "left-over".into(),
        payload: "plain text".into(),
        method: "PUT".into(),
        url: format!("http://{backend}/late"),
        headers: [("x-origin".to_string(), json!("previous-run")), ("x-attempt".to_string(), json!(2))]
            .into_iter()
            .collect(),
    };
    let path = store.join("left-over.json");
    std::fs::write(&path, serde_json::to_vec(&record).unwrap()).unwrap();

    let config = outbound_config(&format!("http://{backend}/"), dir.path());
    let gateway = Gateway::builder(config).start().await.unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.method, "PUT");
    assert_eq!(seen.path, "/late");
    assert_eq!(seen.body, "plain text");
    assert!(common::eventually(|| !path.exists()).await);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_path_like_ids_survive_a_dead_destination() {
    let dir = tempfile::tempdir().unwrap();
    let config = outbound_config("http://127.0.0.1:1/", dir.path());
    let gateway = Gateway::builder(config).start().await.unwrap();
    let transmitter = gateway.transmitter("out").unwrap();

    let result = transmitter
        .transmit(&json!({"id": "orders/1", "v": 1}), TransmitOptions::default())
        .unwrap();
    assert_eq!(result, Transmission::Dispatched { message_id: "orders/1".into() });

    let retry = transmitter.retry().clone();
    let path = retry.record_path("orders/1");
    assert!(common::eventually(|| path.exists()).await);
    assert_eq!(retry.pending().unwrap(), vec![path.clone()]);
    assert_eq!(path.parent(), Some(retry.directory()));

    let record: RetryRecord = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(record.message_id, "orders/1");
    assert_eq!(record.payload, r#"{"id":"orders/1","v":1}"#);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_reply_transmission_uses_open_connection() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_with_retry_dir(
        r#"
        [[sources]]
        name = "echo"
        bind = "127.0.0.1"
        port = 0
        auto_respond = false
        "#,
        dir.path(),
    );

    let slot: Arc<std::sync::Mutex<Option<Arc<ingress_gateway::Transmitter>>>> = Arc::default();
    let callback_slot = slot.clone();
    let gateway = Gateway::builder(config)
        .callback("echo", move |message: Arc<ingress_gateway::Message>| {
            let slot = callback_slot.clone();
            async move {
                let transmitter = slot.lock().unwrap().clone();
                if let Some(transmitter) = transmitter {
                    let text = message.body().as_text().unwrap_or_default().to_uppercase();
                    transmitter.transmit(&json!(text), TransmitOptions::reply_to(message.clone()))?;
                }
                Ok::<(), ingress_gateway::HandlerError>(())
            }
        })
        .start()
        .await
        .unwrap();
    *slot.lock().unwrap() = gateway.transmitter("echo");

    let addr = gateway.local_addr("echo").unwrap();
    let res = common::client()
        .post(format!("http://{addr}/"))
        .body("shout")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "SHOUT");

    gateway.shutdown().await;
}
