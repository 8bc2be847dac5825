mod common;

use common::{launcher, FakeEngine};
use engine_adapter::device::Device;
use engine_adapter::dispatcher::Dispatcher;
use engine_adapter::resolver::{file_name, EngineResolver, Platform};
use engine_adapter::test_runner::TestRunner;
use engine_adapter::AdapterError;
use engine_com::test_flow::{Cpu, Hardware, TestFlow, Version};
use engine_com::Client;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type Server = WebSocketStream<TcpStream>;

async fn push(ws: &mut Server, message: Value) {
    ws.send(Message::Text(message.to_string().into())).await.unwrap();
}

async fn command(ws: &mut Server) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("Expected a command, got {:?}", other),
        }
    }
}

async fn close(mut ws: Server) {
    let _ = ws.close(None).await;
    while let Some(Ok(_)) = ws.next().await {}
}

fn device() -> Device {
    Device {
        name: "bench".to_string(),
        id: "abc123".to_string(),
        hardware: Hardware {
            cpu: vec![Cpu {
                cores: 2,
                threads: 2,
                model: "Test CPU".to_string(),
                vendor: "Tests".to_string(),
                capabilities: vec![],
            }],
            gpu: vec![],
            memory: 8 * 1024 * 1024 * 1024,
            model: "Test OS".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
        },
    }
}

fn store() -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in ["alpha", "beta"] {
        let file = file_name(name, &Version::new(1, 0, 0), "generic");
        std::fs::write(dir.path().join(file), b"").unwrap();
    }
    dir
}

fn start(engines: Value) -> Value {
    json!({
        "key": "start",
        "session": "run-1",
        "suite": {"id": "suite-1", "name": "smoke", "iterations": 1, "engines": engines},
        "recommendedBatchSize": 2,
    })
}

fn engine(name: &str) -> Value {
    json!({
        "name": name,
        "version": {"major": 1, "minor": 0, "patch": 0},
        "timeControl": {"type": "movetime", "value": 20},
        "options": {"hash": 16, "threads": 1},
    })
}

async fn runner(url: &str, store: &TempDir) -> TestRunner {
    let client = Client::connect(url, TestFlow::new()).await.unwrap();
    let resolver = EngineResolver::new(store.path(), Platform::default());
    let launcher = launcher([
        FakeEngine::new("alpha v1.0.0").playing(&["e2e4", "e7e5"]),
        FakeEngine::new("beta v1.0.0").playing(&["e2e4", "e7e5"]),
    ]);
    TestRunner::new(client, resolver, Dispatcher::new(launcher), device())
}

#[tokio::test]
async fn registers_runs_batch_and_reports() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let register = command(&mut ws).await;
        push(&mut ws, json!({"key": "registered", "id": "dev-1"})).await;
        push(&mut ws, start(json!([engine("alpha"), engine("beta")]))).await;
        let report = command(&mut ws).await;
        close(ws).await;
        let _ = done_tx.send((register, report));
    });

    let store = store();
    runner(&url, &store).await.run().await.unwrap();

    let (register, report) = done_rx.await.unwrap();
    assert_eq!(register["command"], "register");
    assert_eq!(register["name"], "bench");
    assert_eq!(register["deviceId"], "abc123");
    assert_eq!(register["hardware"]["cpu"][0]["threads"], 2);
    assert_eq!(register["hardware"]["os"], "linux");
    assert_eq!(register["hardware"]["gpu"], json!([]));

    assert_eq!(report["command"], "report");
    assert_eq!(report["session"], "run-1");
    // Two cores, one thread each: two pairs per round, one round.
    let games = report["moves"].as_array().unwrap();
    assert_eq!(games.len(), 4);
    assert_eq!(games[0].as_array().unwrap().len(), 2);
    assert_eq!(games[0][0][0]["Move"], "e2e4");
    assert_eq!(report["logs"].as_array().unwrap().len(), 4);
    assert_eq!(report["logs"][0][0][0]["type"], "send");
    assert_eq!(report["logs"][0][0][0]["value"], "uci");
}

#[tokio::test]
async fn start_with_one_engine_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        command(&mut ws).await;
        push(&mut ws, json!({"key": "registered", "id": "dev-1"})).await;
        push(&mut ws, start(json!([engine("alpha")]))).await;
        close(ws).await;
    });

    let store = store();
    let result = runner(&url, &store).await.run().await;
    assert!(matches!(result, Err(AdapterError::InvalidBatch(_))));
}

#[tokio::test]
async fn registration_must_be_confirmed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        command(&mut ws).await;
        push(&mut ws, start(json!([engine("alpha"), engine("beta")]))).await;
        close(ws).await;
    });

    let store = store();
    let result = runner(&url, &store).await.run().await;
    assert!(matches!(result, Err(AdapterError::UnexpectedMessage(_))));
}
