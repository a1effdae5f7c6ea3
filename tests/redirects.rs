//! S5: a redirect chain that exceeds `allow_redirects.max` fails with
//! `TooManyRedirects` before any further socket activity, and a chain
//! within the limit is followed to completion.

use pooled_http_client::{
    AllowRedirects, Client, ClientError, Headers, Method, PoolConfig, RequestOptions,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn drain_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = [0u8; 1024];
    let mut seen = Vec::new();
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        seen.extend_from_slice(&buf[..n]);
        if seen.ends_with(b"\r\n\r\n") || n == 0 {
            break;
        }
    }
}

#[tokio::test]
async fn redirect_chain_within_limit_is_followed() {
    let redirecting = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let redirecting_addr = redirecting.local_addr().unwrap();
    let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target_addr = target.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = redirecting.accept().await.unwrap();
        drain_request(&mut socket).await;
        let location = format!("http://{target_addr}/landed");
        let body = format!(
            "HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
        socket.write_all(body.as_bytes()).await.unwrap();
    });

    tokio::spawn(async move {
        let (mut socket, _) = target.accept().await.unwrap();
        drain_request(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nlanded")
            .await
            .unwrap();
    });

    let client = Client::new(PoolConfig::default());
    let resp = client
        .get(&format!("http://{redirecting_addr}/start"), Headers::new())
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, b"landed");
}

#[tokio::test]
async fn s5_redirect_chain_past_limit_fails_with_too_many_redirects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // Always redirects back to itself; the client should give up after
        // allow_redirects.max hops without our needing a moving target.
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            drain_request(&mut socket).await;
            let body = format!(
                "HTTP/1.1 302 Found\r\nLocation: http://{addr}/again\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = socket.write_all(body.as_bytes()).await;
        }
    });

    let client = Client::new(PoolConfig::default());
    let result = client
        .request(
            &format!("http://{addr}/start"),
            RequestOptions {
                method: Method::Get,
                allow_redirects: AllowRedirects { max: 2 },
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(ClientError::TooManyRedirects)));
}
