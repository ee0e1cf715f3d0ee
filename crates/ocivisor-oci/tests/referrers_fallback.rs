//! Exercises the referrers-endpoint-404-then-tag-schema-fallback path.

use ocivisor_oci::RegistryClient;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn spawn_referrers_stub(tag_index_body: String) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(s) => s,
                Err(_) => break,
            };
            let tag_index_body = tag_index_body.clone();
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

                let response = if path.contains("/referrers/") {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                } else if path.contains("/manifests/sha256-") {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        tag_index_body.len(),
                        tag_index_body
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

#[tokio::test]
async fn referrers_404_falls_back_to_tag_schema_and_returns_its_index() {
    let digest = "sha256:abcd0000000000000000000000000000000000000000000000000000000000";
    let tag_index = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": [
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": "sha256:1111111111111111111111111111111111111111111111111111111111111111",
                "size": 123
            }
        ]
    })
    .to_string();

    let addr = spawn_referrers_stub(tag_index).await;
    let client = RegistryClient::new();
    let registry = format!("http://{addr}");

    let index = client.referrers(&registry, "my/repo", digest, None).await.unwrap();
    assert_eq!(index.schema_version, 2);
    assert_eq!(index.manifests.len(), 1);
}

async fn spawn_always_404_stub() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(s) => s,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn referrers_fallback_failure_yields_empty_index() {
    // Stub always 404s, including on the tag fallback path.
    let addr = spawn_always_404_stub().await;
    let client = RegistryClient::new();
    let registry = format!("http://{addr}");

    let digest = "sha256:deadbeef00000000000000000000000000000000000000000000000000000000";
    let index = client
        .referrers(&registry, "my/repo", digest, None)
        .await
        .unwrap();
    assert_eq!(index.manifests.len(), 0);
    assert_eq!(index.schema_version, 2);
}
