//! Drives the hub's fan-out path end to end: a fake
//! producer registers with a real Network Manager, two consumers subscribe
//! to the hub, a published payload reaches both, and unsubscribing the last
//! consumer tears the upstream subscription down.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use dqm_core::{BindConfig, Connection, build_forwarded_frame, build_subscription_frame, parse_subscription_frame};
use dqm_core::util::find_available_port;
use dqm_hub::ServiceForwardingHub;
use dqm_netmgr::NetworkManager;
use dqm_transport::{EventLoop, ServerEndpoint};

const WIDTH: usize = 16;
const SERVICE: &str = "/svc";

async fn recv_binary(ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>) -> Vec<u8> {
    match timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("frame should arrive within 2s")
        .expect("stream should not end")
        .unwrap()
    {
        Message::Binary(data) => data.to_vec(),
        other => panic!("expected a binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn fan_out_and_teardown() {
    // Network Manager, so the hub can resolve `/svc` to the fake producer.
    let netmgr_loop = EventLoop::new();
    netmgr_loop.start(false, 5).unwrap();
    let netmgr = NetworkManager::new(netmgr_loop.manager());
    let netmgr_port = netmgr
        .bind(BindConfig::new(find_available_port(22000, 23000)))
        .await
        .unwrap();

    // Fake producer: a bare Server Endpoint speaking the same `/service`
    // subscribe/forward protocol the hub speaks upstream.
    let producer_loop = EventLoop::new();
    producer_loop.start(false, 5).unwrap();
    let producer_server = Arc::new(ServerEndpoint::new(producer_loop.manager()));
    let upstream_conn: Arc<Mutex<Option<Connection>>> = Arc::new(Mutex::new(None));
    let upstream_closed = Arc::new(Mutex::new(false));
    {
        let upstream_conn = upstream_conn.clone();
        producer_server.set_on_message(move |conn, frame| {
            if let Ok((name, action)) = parse_subscription_frame(&frame.payload, WIDTH)
                && name == SERVICE
                && action == "subscribe"
            {
                *upstream_conn.lock() = Some(conn);
            }
        });
    }
    {
        let upstream_closed = upstream_closed.clone();
        producer_server.set_on_connection_close(move |_conn| {
            *upstream_closed.lock() = true;
        });
    }
    let producer_port = producer_server
        .bind(BindConfig::new(find_available_port(23001, 24000)))
        .await
        .unwrap();

    // Register the producer with the Network Manager directly through the
    // fleet (equivalent to a real registration handshake, without needing a
    // second event loop's Client Endpoint just for this).
    let mut info = dqm_core::ServerInfo::new("fake-producer", "127.0.0.1", producer_port);
    info.services
        .insert(SERVICE.to_string(), dqm_core::ServiceType::PubSub);
    netmgr
        .fleet()
        .register(&Connection::new(9999, "/servers"), info)
        .unwrap();

    // The hub itself.
    let hub_loop = EventLoop::new();
    hub_loop.start(false, 5).unwrap();
    let hub = ServiceForwardingHub::new(hub_loop.manager(), "127.0.0.1", netmgr_port, WIDTH).unwrap();
    let hub_port = hub
        .bind(BindConfig::new(find_available_port(24001, 25000)))
        .await
        .unwrap();

    // Two consumers subscribe.
    let (mut consumer1, _) = connect_async(format!("ws://127.0.0.1:{hub_port}/service"))
        .await
        .unwrap();
    let (mut consumer2, _) = connect_async(format!("ws://127.0.0.1:{hub_port}/service"))
        .await
        .unwrap();

    let subscribe = build_subscription_frame(SERVICE, "subscribe", WIDTH).unwrap();
    consumer1
        .send(Message::Binary(subscribe.clone().into()))
        .await
        .unwrap();
    consumer2
        .send(Message::Binary(subscribe.into()))
        .await
        .unwrap();

    // Wait for the hub's upstream subscription to reach the producer.
    timeout(Duration::from_secs(2), async {
        loop {
            if upstream_conn.lock().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upstream subscription should be observed");

    // Producer publishes one payload.
    let conn = upstream_conn.lock().clone().unwrap();
    let forwarded = build_forwarded_frame(SERVICE, b"payload-one", WIDTH).unwrap();
    producer_server
        .send(&conn, dqm_core::WebsocketFrame::binary(forwarded.clone()))
        .unwrap();

    let got1 = recv_binary(&mut consumer1).await;
    let got2 = recv_binary(&mut consumer2).await;
    assert_eq!(got1, forwarded);
    assert_eq!(got2, forwarded);
    let (name, payload) = dqm_core::split_name_field(&got1, WIDTH).unwrap();
    assert_eq!(name, SERVICE);
    assert_eq!(payload, b"payload-one");

    // Consumer 1 disconnects; consumer 2 still gets the next payload.
    consumer1.close(None).await.ok();
    let forwarded2 = build_forwarded_frame(SERVICE, b"payload-two", WIDTH).unwrap();
    // Give the hub a moment to process consumer1's close before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    producer_server
        .send(&conn, dqm_core::WebsocketFrame::binary(forwarded2.clone()))
        .unwrap();
    let got2b = recv_binary(&mut consumer2).await;
    assert_eq!(got2b, forwarded2);

    // Consumer 2 also disconnects: the hub must drop its upstream
    // subscription, observable as the producer's connection closing.
    consumer2.close(None).await.ok();
    timeout(Duration::from_secs(2), async {
        loop {
            if *upstream_closed.lock() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("producer should observe the upstream connection close");

    assert_eq!(hub.active_service_count(), 0);
}
