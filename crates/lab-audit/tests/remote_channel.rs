use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use lab_audit::{FileChannel, RemoteAuth, RemoteChannel};
use lab_core::{AuditChannel, AuditContext, AuditDeliveryError, AuditFlags, AuditMessage, Auditor, Delivery};

/// Servidor HTTP de una sola petición: responde `status` y devuelve la
/// petición recibida (headers + body).
fn serve_once(status: &'static str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/audit", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let body_start = loop {
            let n = stream.read(&mut chunk).unwrap();
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if n == 0 {
                break buf.len();
            }
        };
        let head = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
        let length = head.lines()
                         .find_map(|l| l.strip_prefix("content-length:"))
                         .and_then(|v| v.trim().parse::<usize>().ok())
                         .unwrap_or(0);
        while buf.len() < body_start + length {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let response = format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        stream.write_all(response.as_bytes()).unwrap();
        tx.send(String::from_utf8_lossy(&buf).into_owned()).unwrap();
    });
    (url, rx)
}

fn ctx() -> AuditContext {
    AuditContext { task: "add".into(),
                   fingerprint: None }
}

fn message() -> AuditMessage {
    AuditMessage::new("urn:ctx", "labflow:0001", AuditFlags::PROV).with("endedAtTime", "2026-01-01T00:00:00.000000Z")
}

#[test]
fn posts_json_and_returns_status() {
    let (url, rx) = serve_once("201 Created");
    let channel = RemoteChannel::new(url).unwrap();
    let delivery = channel.send(&message(), &ctx()).unwrap();
    assert_eq!(delivery, Delivery::Posted { status: 201 });

    let request = rx.recv().unwrap();
    assert!(request.starts_with("POST /audit"));
    assert!(request.to_ascii_lowercase().contains("content-type: application/json"));
    assert!(request.contains("\"@id\":\"labflow:0001\""));
    assert!(request.contains("\"endedAtTime\""));
}

#[test]
fn bearer_and_computed_credentials_are_sent() {
    let (url, rx) = serve_once("200 OK");
    RemoteChannel::new(url).unwrap()
                           .with_auth(RemoteAuth::Bearer("s3cret".into()))
                           .send(&message(), &ctx())
                           .unwrap();
    assert!(rx.recv().unwrap().to_ascii_lowercase().contains("authorization: bearer s3cret"));

    let (url, rx) = serve_once("200 OK");
    RemoteChannel::new(url).unwrap()
                           .with_auth(RemoteAuth::computed(|| Ok("Token abc".to_string())))
                           .send(&message(), &ctx())
                           .unwrap();
    assert!(rx.recv().unwrap().to_ascii_lowercase().contains("authorization: token abc"));
}

#[test]
fn failing_credential_is_a_transport_error() {
    let channel = RemoteChannel::new("http://127.0.0.1:9/never").unwrap()
                                                                 .with_auth(RemoteAuth::computed(|| Err("vault sealed".to_string())));
    match channel.send(&message(), &ctx()) {
        Err(AuditDeliveryError::Transport { reason, .. }) => assert_eq!(reason, "vault sealed"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn unreachable_endpoint_does_not_break_the_auditor() {
    // puerto libre: se obtiene y se suelta
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let remote = RemoteChannel::new(format!("http://127.0.0.1:{port}/audit")).unwrap();
    assert!(matches!(remote.send(&message(), &ctx()), Err(AuditDeliveryError::Transport { .. })));

    let auditor = Auditor::new(AuditFlags::PROV).with_channel(Arc::new(remote))
                                                .with_channel(Arc::new(FileChannel::new(dir.path())));
    assert_eq!(auditor.audit(&message(), &ctx()), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
