//! End-to-end runs with the real node, application and network services.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use node_launcher::lifecycle::{HaltCondition, QuitReason, QuitWaiter};
use node_launcher::node::LocalNodeFactory;
use node_launcher::server::grpc::GRPC_STATUS;
use node_launcher::server::grpc_web::GRPC_WEB_JSON;
use node_launcher::server::{GrpcClient, NetworkServices};
use node_launcher::{RunContext, Supervisor};
use serde_json::{json, Value};

/// Poll `url` until it answers 200 or `deadline` passes.
async fn get_when_ready(client: &reqwest::Client, url: &str) -> reqwest::Response {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(res) = client.get(url).send().await {
            if res.status().is_success() {
                return res;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "{url} never became ready");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Poll a POST endpoint with `body` until it answers 200 or `deadline` passes.
async fn post_when_ready(client: &reqwest::Client, url: &str, body: &Value) -> reqwest::Response {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(res) = client.post(url).json(body).send().await {
            if res.status().is_success() {
                return res;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "{url} never became ready");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn full_node_serves_every_endpoint() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    enable_all(&mut config, true);
    config.consensus.block_interval_ms = 50;
    let (api, grpc, grpc_web, rosetta) = (free_port(), free_port(), free_port(), free_port());
    config.api.address = format!("tcp://127.0.0.1:{api}");
    config.grpc.address = format!("127.0.0.1:{grpc}");
    config.grpc_web.address = format!("127.0.0.1:{grpc_web}");
    config.rosetta.address = format!("127.0.0.1:{rosetta}");

    let (quit, trigger) = QuitWaiter::manual();
    let ctx = RunContext::new(config).unwrap().with_halt_trigger(trigger.clone());
    let supervisor = Supervisor::new(
        ctx,
        kvstore_creator(),
        Arc::new(LocalNodeFactory),
        Arc::new(NetworkServices::new()),
    )
    .with_startup_window(Duration::from_millis(200));
    let running = tokio::spawn(supervisor.run(quit));

    let http = reqwest::Client::new();
    let info: Value = get_when_ready(&http, &format!("http://127.0.0.1:{api}/node_info"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(info["default_node_info"]["network"], "test-chain");

    let res = http
        .post(format!("http://127.0.0.1:{api}/txs"))
        .json(&json!({ "tx": "name=alice" }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());

    let stored: Value = get_when_ready(&http, &format!("http://127.0.0.1:{api}/kv/name"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stored["value"], "alice");

    // Rosetta starts last, so every other service is up once it answers.
    let networks: Value = post_when_ready(&http, &format!("http://127.0.0.1:{rosetta}/network/list"), &json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(networks["network_identifiers"][0]["blockchain"], "app");

    let grpc_client = GrpcClient::new(format!("127.0.0.1:{grpc}"));
    let reply = grpc_client
        .call("/kvstore.v1.Query/Get", &json!({ "key": "name" }))
        .await
        .unwrap();
    assert_eq!(reply["value"], "alice");

    let res = http
        .post(format!("http://127.0.0.1:{grpc_web}/kvstore.v1.Query/Get"))
        .header("content-type", GRPC_WEB_JSON)
        .body(r#"{"key":"name"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["content-type"], GRPC_WEB_JSON);
    assert_eq!(res.headers()[GRPC_STATUS], "0");

    let status = http
        .post(format!("http://127.0.0.1:{rosetta}/network/status"))
        .json(&json!({ "network_identifier": { "blockchain": "app", "network": "network" } }))
        .send()
        .await
        .unwrap();
    assert!(status.status().is_success());

    trigger.raise(QuitReason::Interrupt);
    assert_eq!(running.await.unwrap().unwrap(), QuitReason::Interrupt);

    assert!(reqwest::Client::new()
        .get(format!("http://127.0.0.1:{api}/node_info"))
        .send()
        .await
        .is_err());
}

#[tokio::test]
async fn halt_height_ends_the_run_cleanly() {
    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    enable_all(&mut config, false);
    config.consensus.block_interval_ms = 20;
    config.base.halt_height = 3;

    let (quit, trigger) = QuitWaiter::manual();
    let ctx = RunContext::new(config).unwrap().with_halt_trigger(trigger);
    let supervisor = Supervisor::new(
        ctx,
        kvstore_creator(),
        Arc::new(LocalNodeFactory),
        Arc::new(NetworkServices::new()),
    );

    let reason = tokio::time::timeout(Duration::from_secs(10), supervisor.run(quit))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, QuitReason::Halt(HaltCondition::Height(3)));
}

#[tokio::test]
async fn standalone_listener_answers_abci_over_a_socket() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let home = tempfile::tempdir().unwrap();
    let mut config = node_config(home.path());
    config.abci.with_consensus = false;
    let port = free_port();
    config.abci.address = format!("tcp://127.0.0.1:{port}");

    let (quit, trigger) = QuitWaiter::manual();
    let ctx = RunContext::new(config).unwrap().with_halt_trigger(trigger.clone());
    let supervisor = Supervisor::new(
        ctx,
        kvstore_creator(),
        Arc::new(LocalNodeFactory),
        Arc::new(NetworkServices::new()),
    );
    let running = tokio::spawn(supervisor.run(quit));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let stream = loop {
        match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => break stream,
            Err(e) => {
                assert!(tokio::time::Instant::now() < deadline, "listener never came up: {e}");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    };
    let (read, mut write) = stream.into_split();
    write.write_all(b"{\"type\":\"echo\",\"message\":\"hi\"}\n").await.unwrap();
    let mut line = String::new();
    BufReader::new(read).read_line(&mut line).await.unwrap();
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["type"], "echo");
    assert_eq!(reply["message"], "hi");
    drop(write);

    trigger.raise(QuitReason::Terminate);
    assert_eq!(running.await.unwrap().unwrap(), QuitReason::Terminate);
}
