//! End-to-end coverage of the Wake-on-LAN relay over a real loopback TCP
//! connection, exercising the key-then-MAC-then-send validation order.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    thread,
};

use aistack::wol::WolRelay;

fn send_request(addr: SocketAddr, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).unwrap();
    stream.shutdown(std::net::Shutdown::Write).ok();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();

    let status = response
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (status, response)
}

#[test]
fn wrong_shared_key_is_rejected_with_401() {
    let relay = WolRelay::bind("127.0.0.1:0".parse().unwrap(), "correct-key".to_string()).unwrap();
    let addr = relay.local_addr().unwrap();
    let handle = thread::spawn(move || relay.serve_one());

    let (status, _) = send_request(addr, "/wake", r#"{"mac":"aa:bb:cc:dd:ee:ff","key":"wrong"}"#);
    assert_eq!(status, 401);

    handle.join().unwrap().unwrap();
}

#[test]
fn a_valid_request_with_a_loopback_broadcast_address_succeeds() {
    let relay = WolRelay::bind("127.0.0.1:0".parse().unwrap(), "correct-key".to_string()).unwrap();
    let addr = relay.local_addr().unwrap();
    let handle = thread::spawn(move || relay.serve_one());

    let body = r#"{"mac":"aa:bb:cc:dd:ee:ff","broadcast":"127.0.0.1","key":"correct-key"}"#;
    let (status, response) = send_request(addr, "/wake", body);
    assert_eq!(status, 200);
    assert!(response.contains("\"status\":\"ok\""));

    handle.join().unwrap().unwrap();
}

#[test]
fn an_unrecognised_path_is_404() {
    let relay = WolRelay::bind("127.0.0.1:0".parse().unwrap(), "correct-key".to_string()).unwrap();
    let addr = relay.local_addr().unwrap();
    let handle = thread::spawn(move || relay.serve_one());

    let (status, _) = send_request(addr, "/other", "{}");
    assert_eq!(status, 404);

    handle.join().unwrap().unwrap();
}

#[test]
fn a_malformed_body_is_400_not_401() {
    let relay = WolRelay::bind("127.0.0.1:0".parse().unwrap(), "correct-key".to_string()).unwrap();
    let addr = relay.local_addr().unwrap();
    let handle = thread::spawn(move || relay.serve_one());

    let (status, _) = send_request(addr, "/wake", "not json at all");
    assert_eq!(status, 400);

    handle.join().unwrap().unwrap();
}
