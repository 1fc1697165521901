//! Integration tests for the Network Manager's `/servers` registration
//! handshake and `/list` query, driven over real TCP sockets.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use dqm_netmgr::NetworkManager;
use dqm_core::BindConfig;
use dqm_core::util::find_available_port;
use dqm_transport::EventLoop;

async fn spawn_netmgr() -> (EventLoop, NetworkManager, u16) {
    let loop_ = EventLoop::new();
    loop_.start(false, 5).unwrap();
    let netmgr = NetworkManager::new(loop_.manager());
    let candidate = find_available_port(21000, 22000);
    assert!(candidate > 0, "no free port found for test netmgr");
    let port = netmgr
        .bind(BindConfig::new(candidate))
        .await
        .unwrap();
    (loop_, netmgr, port)
}

#[tokio::test]
async fn register_then_list_shows_the_producer() {
    let (_loop, netmgr, port) = spawn_netmgr().await;

    let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/servers"))
        .await
        .unwrap();
    let register = json!({
        "action": "register",
        "server": "ecal-dqm",
        "host": "10.0.0.5",
        "port": 6000,
        "services": {"/histograms": 2}
    });
    ws.send(Message::Text(register.to_string().into()))
        .await
        .unwrap();

    timeout(Duration::from_secs(1), async {
        loop {
            if netmgr.fleet().lookup("ecal-dqm").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registration should be observed within 1s");

    let servers = netmgr.fleet().list();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].server, "ecal-dqm");
    assert_eq!(servers[0].host, "10.0.0.5");
}

#[tokio::test]
async fn duplicate_registration_receives_a_regfail() {
    let (_loop, netmgr, port) = spawn_netmgr().await;

    let (mut ws_a, _) = connect_async(format!("ws://127.0.0.1:{port}/servers"))
        .await
        .unwrap();
    let register = json!({
        "action": "register",
        "server": "ecal-dqm",
        "host": "10.0.0.5",
        "port": 6000,
        "services": {}
    });
    ws_a.send(Message::Text(register.to_string().into()))
        .await
        .unwrap();

    timeout(Duration::from_secs(1), async {
        loop {
            if netmgr.fleet().lookup("ecal-dqm").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let (mut ws_b, _) = connect_async(format!("ws://127.0.0.1:{port}/servers"))
        .await
        .unwrap();
    let conflicting = json!({
        "action": "register",
        "server": "ecal-dqm",
        "host": "10.0.0.6",
        "port": 6001,
        "services": {}
    });
    ws_b.send(Message::Text(conflicting.to_string().into()))
        .await
        .unwrap();

    let reply = timeout(Duration::from_secs(1), ws_b.next())
        .await
        .expect("regfail should arrive")
        .unwrap()
        .unwrap();
    let Message::Text(text) = reply else {
        panic!("expected a text frame");
    };
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["subject"], "regfail");
    assert!(body["reason"].as_str().is_some_and(|r| !r.is_empty()));

    assert_eq!(netmgr.fleet().lookup("ecal-dqm").unwrap().host, "10.0.0.5");
}

#[tokio::test]
async fn list_is_queryable_over_plain_http_get() {
    let (_loop, netmgr, port) = spawn_netmgr().await;

    let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/servers"))
        .await
        .unwrap();
    let register = json!({
        "action": "register",
        "server": "hcal-dqm",
        "host": "10.0.0.9",
        "port": 6100,
        "services": {}
    });
    ws.send(Message::Text(register.to_string().into()))
        .await
        .unwrap();

    timeout(Duration::from_secs(1), async {
        loop {
            if netmgr.fleet().lookup("hcal-dqm").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let body = reqwest::get(format!("http://127.0.0.1:{port}/list"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let servers: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&body).unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers["hcal-dqm"]["server"], "hcal-dqm");
}
