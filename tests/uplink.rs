use face_attendance::config::BackendConfig;
use face_attendance::error::AttendanceError;
use face_attendance::runtime::Event;
use face_attendance::service::{ConnectionState, UplinkChannel};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{sync_channel, Receiver};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn backend_config(port: u16) -> BackendConfig {
    BackendConfig {
        host: "127.0.0.1".to_string(),
        port,
        retry_interval_ms: 5000,
        connect_timeout_ms: 1000,
        write_timeout_ms: 1000,
    }
}

fn connected(listener: &TcpListener) -> (UplinkChannel, Receiver<Event>, std::net::TcpStream) {
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = sync_channel(16);
    let mut uplink = UplinkChannel::new(backend_config(port), tx);
    assert_eq!(uplink.state(), ConnectionState::Disconnected);

    uplink.connect().unwrap();
    assert_eq!(uplink.state(), ConnectionState::Connecting);
    // A second request while connecting is a no-op
    uplink.connect().unwrap();

    let (server, _) = listener.accept().unwrap();
    match rx.recv_timeout(WAIT).unwrap() {
        Event::BackendConnected { generation, stream } => {
            uplink.on_connected(generation, stream).unwrap();
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(uplink.state(), ConnectionState::Connected);
    (uplink, rx, server)
}

#[test]
fn sends_length_prefixed_images() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (mut uplink, _rx, mut server) = connected(&listener);

    uplink.send(b"\xFF\xD8jpeg\xFF\xD9").unwrap();
    uplink.send(b"").unwrap();

    let mut prefix = [0u8; 8];
    server.read_exact(&mut prefix).unwrap();
    assert_eq!(u64::from_be_bytes(prefix), 8);
    let mut payload = vec![0u8; 8];
    server.read_exact(&mut payload).unwrap();
    assert_eq!(payload, b"\xFF\xD8jpeg\xFF\xD9");

    server.read_exact(&mut prefix).unwrap();
    assert_eq!(u64::from_be_bytes(prefix), 0);
}

#[test]
fn decodes_replies_and_notices_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (mut uplink, rx, mut server) = connected(&listener);

    server
        .write_all(br#"{"employeeID":"42","name":"Ada","department":"R&D","time":"09:05"}"#)
        .unwrap();

    let mut replies = Vec::new();
    while replies.is_empty() {
        match rx.recv_timeout(WAIT).unwrap() {
            Event::BackendReplied { generation, data } => {
                replies.extend(uplink.on_reply(generation, &data));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].employee_id, "42");
    assert_eq!(replies[0].name, "Ada");

    drop(server);
    match rx.recv_timeout(WAIT).unwrap() {
        Event::BackendDisconnected { generation } => assert!(uplink.on_disconnected(generation)),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(uplink.state(), ConnectionState::Disconnected);
    assert!(matches!(uplink.send(b"x"), Err(AttendanceError::Connection(_))));
}

#[test]
fn refused_connection_returns_to_disconnected() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (tx, rx) = sync_channel(4);
    let mut uplink = UplinkChannel::new(backend_config(port), tx);

    uplink.connect().unwrap();
    match rx.recv_timeout(WAIT).unwrap() {
        Event::BackendConnectFailed { generation, reason } => {
            assert!(!reason.is_empty());
            uplink.on_connect_failed(generation, &reason);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(uplink.state(), ConnectionState::Disconnected);
}

#[test]
fn stale_connection_is_ignored() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let (mut uplink, _rx, _server) = connected(&listener);

    // Bytes from an older connection must not reach the decoder
    let stale = uplink.on_reply(0, br#"{"employeeID":"1","name":"Old"}"#);
    assert!(stale.is_empty());
    assert!(!uplink.on_disconnected(0));
    assert_eq!(uplink.state(), ConnectionState::Connected);
}
