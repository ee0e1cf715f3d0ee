//! Exercises `RegistryClient::catalog` against a tiny hand-rolled HTTP
//! stub rather than a heavyweight mocking crate, matching seed scenario 5:
//! 250 repositories, page size 100, three requests.

use ocivisor_oci::RegistryClient;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn spawn_catalog_stub(repos: Vec<String>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(s) => s,
                Err(_) => break,
            };
            let repos = repos.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("")
                    .to_string();

                let last = path
                    .split_once("last=")
                    .map(|(_, rest)| urldecode(rest.split('&').next().unwrap_or("")));

                let start = match last {
                    Some(l) => repos.iter().position(|r| r.as_str() > l.as_str()).unwrap_or(repos.len()),
                    None => 0,
                };
                let page: Vec<&String> = repos.iter().skip(start).take(100).collect();
                let body = serde_json::json!({ "repositories": page }).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

fn urldecode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut bytes = s.bytes().peekable();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next().unwrap_or(b'0');
            let lo = bytes.next().unwrap_or(b'0');
            let hex = [hi, lo];
            let hex_str = std::str::from_utf8(&hex).unwrap_or("00");
            let byte = u8::from_str_radix(hex_str, 16).unwrap_or(b'?');
            out.push(byte as char);
        } else {
            out.push(b as char);
        }
    }
    out
}

#[tokio::test]
async fn catalog_pagination_accumulates_all_repositories_across_pages() {
    let repos: Vec<String> = (0..250).map(|i| format!("repo{i:03}")).collect();
    let addr = spawn_catalog_stub(repos.clone()).await;

    let client = RegistryClient::new();
    let registry = format!("http://{addr}");
    let found = client.catalog(&registry, None).await.unwrap();

    assert_eq!(found.len(), 250);
    assert_eq!(found, repos);
}

#[tokio::test]
async fn catalog_pagination_with_prefix_skips_ahead_and_stops_past_prefix() {
    let mut repos: Vec<String> = (0..50).map(|i| format!("lib{i:03}")).collect();
    repos.push("lic-unrelated".to_string());
    repos.sort();
    let addr = spawn_catalog_stub(repos).await;

    let client = RegistryClient::new();
    let registry = format!("http://{addr}");
    let found = client.catalog(&registry, Some("lib")).await.unwrap();

    assert_eq!(found.len(), 50);
    assert!(found.iter().all(|n| n.starts_with("lib")));
}
