//! End-to-end tests for the three source modes.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use reqwest::StatusCode;
use tokio::sync::mpsc;

use ingress_gateway::http::DEFAULT_RESPONSE_MESSAGE;
use ingress_gateway::routing::Route;
use ingress_gateway::{Confirmation, EndpointRegistry, Gateway, HandlerError, Message};

mod common;

#[tokio::test]
async fn test_paths_sources_share_one_listener() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_with_retry_dir(
        r#"
        [[sources]]
        name = "fubar"
        kind = "paths"
        bind = "127.0.0.1"
        port = 0
        method = "post"
        path = "/fubar"
        auto_respond = false

        [[sources]]
        name = "globbed"
        kind = "paths"
        bind = "127.0.0.1"
        port = 0
        method = "get"
        path = "/glob/v*/*"
        "#,
        dir.path(),
    );

    let (seen_tx, mut seen) = mpsc::unbounded_channel::<(String, String)>();
    let fubar_tx = seen_tx.clone();
    let gateway = Gateway::builder(config)
        .source_callback("fubar", "confirm", move |message: Arc<Message>| {
            let tx = fubar_tx.clone();
            async move {
                let body = message.body().as_text().unwrap_or_default().to_string();
                let _ = tx.send(("fubar".into(), body));
                message.confirm(Confirmation::new().body("custom response"));
                Ok::<(), HandlerError>(())
            }
        })
        .source_callback("globbed", "record", move |message: Arc<Message>| {
            let tx = seen_tx.clone();
            async move {
                let _ = tx.send((message.path().to_string(), format!("{:?}", message.body().is_empty())));
                Ok::<(), HandlerError>(())
            }
        })
        .start()
        .await
        .unwrap();

    let addr = gateway.local_addr("fubar").unwrap();
    assert_eq!(gateway.local_addr("globbed"), Some(addr));
    let client = common::client();

    let res = client
        .post(format!("http://{addr}/fubar"))
        .body("test")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "custom response");
    assert_eq!(seen.recv().await.unwrap(), ("fubar".to_string(), "test".to_string()));

    let res = client.get(format!("http://{addr}/glob/v1/anything")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), DEFAULT_RESPONSE_MESSAGE);
    let (path, empty) = tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(path, "/glob/v1/anything");
    assert_eq!(empty, "true");

    let res = client.get(format!("http://{addr}/fubar")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "Requested path not found!");

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_path_source_receive_without_callbacks() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_with_retry_dir(
        r#"
        [[sources]]
        name = "inbox"
        kind = "paths"
        bind = "127.0.0.1"
        port = 0
        method = "put"
        path = "/inbox"

        [sources.response]
        code = "accepted"
        message = "queued"
        "#,
        dir.path(),
    );
    let gateway = Gateway::builder(config).start().await.unwrap();
    let addr = gateway.local_addr("inbox").unwrap();

    let res = common::client()
        .put(format!("http://{addr}/inbox?x=1"))
        .json(&serde_json::json!({"n": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.text().await.unwrap(), "queued");

    let source = gateway.path_source("inbox").unwrap();
    let message = tokio::time::timeout(Duration::from_secs(5), source.receive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.body().as_json().unwrap()["n"], 5);
    assert_eq!(message.query()["x"], 1);
    assert!(message.is_confirmed());

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_callbacks_source_authorization_and_body_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_with_retry_dir(
        r#"
        [[sources]]
        name = "hooks"
        kind = "callbacks"
        bind = "127.0.0.1"
        port = 0

        [sources.authorization]
        allowed_origins = ["127.0.0.1"]
        credentials = { ops = "s3cret" }
        valid_on = "all"
        "#,
        dir.path(),
    );

    let (tx, mut seen) = mpsc::unbounded_channel::<String>();
    let gateway = Gateway::builder(config)
        .callback("record", move |message: Arc<Message>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(message.path().to_string());
                Ok::<(), HandlerError>(())
            }
        })
        .start()
        .await
        .unwrap();
    let addr = gateway.local_addr("hooks").unwrap();
    let client = common::client();

    let res = client.post(format!("http://{addr}/hook")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("http://{addr}/hook"))
        .basic_auth("ops", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(format!("http://{addr}/hook"))
        .header("content-type", "application/json")
        .header(
            "authorization",
            format!("Basic {}", base64::engine::general_purpose::STANDARD.encode("ops:s3cret")),
        )
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(format!("http://{addr}/hook"))
        .basic_auth("ops", Some("s3cret"))
        .body("ok")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), DEFAULT_RESPONSE_MESSAGE);
    assert_eq!(seen.recv().await.unwrap(), "/hook");
    assert!(seen.try_recv().is_err());

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_endpoints_source_routes_by_method_and_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_with_retry_dir(
        r#"
        [endpoints]
        except = ["disabled"]

        [[sources]]
        name = "api"
        kind = "endpoints"
        bind = "127.0.0.1"
        port = 0
        auto_respond = false
        "#,
        dir.path(),
    );

    let mut registry = EndpointRegistry::new();
    registry.register("items", |router| {
        router.get("/items", |message: Arc<Message>, _captures: Vec<String>| async move {
            message.confirm(Confirmation::new().json(serde_json::json!({"items": []})));
            Ok::<(), HandlerError>(())
        })?;
        router.post(
            Route::pattern("/items/([0-9]+)/(\\w+)"),
            |message: Arc<Message>, captures: Vec<String>| async move {
                message.confirm(Confirmation::new().body(captures.join(",")));
                Ok::<(), HandlerError>(())
            },
        )?;
        router.delete("/items", |_message: Arc<Message>, _captures: Vec<String>| async move {
            Err::<(), HandlerError>("refusing to delete".into())
        })?;
        Ok(())
    });
    registry.register("disabled", |router| {
        router.get("/disabled", |message: Arc<Message>, _captures: Vec<String>| async move {
            message.confirm(Confirmation::new());
            Ok::<(), HandlerError>(())
        })?;
        Ok(())
    });

    let gateway = Gateway::builder(config).endpoints(registry).start().await.unwrap();
    let addr = gateway.local_addr("api").unwrap();
    let client = common::client();

    let res = client.get(format!("http://{addr}/items")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.text().await.unwrap(), r#"{"items":[]}"#);

    let res = client.post(format!("http://{addr}/items/42/rename")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "42,rename");

    let res = client.get(format!("http://{addr}/disabled")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    gateway.shutdown().await;
}
