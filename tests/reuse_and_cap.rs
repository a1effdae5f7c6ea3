//! S1 (reuse) and S2 (per-origin cap) scenarios.

use pooled_http_client::{Client, Headers, PoolConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn read_request<S: AsyncReadExt + Unpin>(socket: &mut S) {
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
async fn s1_three_sequential_gets_reuse_one_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connects = Arc::new(AtomicUsize::new(0));

    let connects_task = Arc::clone(&connects);
    tokio::spawn(async move {
        // A single accepted socket serves all three requests in sequence,
        // proving the client never opens a second connection.
        let (mut socket, _) = listener.accept().await.unwrap();
        connects_task.fetch_add(1, Ordering::SeqCst);
        for _ in 0..3 {
            read_request(&mut socket).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: keep-alive\r\n\r\nok")
                .await
                .unwrap();
        }
    });

    let client = Client::new(PoolConfig::default());
    let url = format!("http://{addr}/");
    for _ in 0..3 {
        let resp = client.get(&url, Headers::new()).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"ok");
    }

    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s2_per_origin_cap_bounds_concurrency() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_observed = Arc::new(AtomicUsize::new(0));

    let in_flight_task = Arc::clone(&in_flight);
    let max_observed_task = Arc::clone(&max_observed);
    tokio::spawn(async move {
        for _ in 0..5 {
            let (mut socket, _) = listener.accept().await.unwrap();
            let in_flight = Arc::clone(&in_flight_task);
            let max_observed = Arc::clone(&max_observed_task);
            tokio::spawn(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(now, Ordering::SeqCst);
                read_request(&mut socket).await;
                tokio::time::sleep(std::time::Duration::from_millis(30)).await;
                socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                    )
                    .await
                    .unwrap();
                in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    let client = Client::new(PoolConfig {
        max_conn_per_addr: 2,
        ..Default::default()
    });
    let url = format!("http://{addr}/");

    let mut handles = Vec::new();
    for _ in 0..5 {
        let client = client.clone();
        let url = url.clone();
        handles.push(tokio::spawn(
            async move { client.get(&url, Headers::new()).await },
        ));
    }
    for handle in handles {
        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.body, b"ok");
    }

    assert!(max_observed.load(Ordering::SeqCst) <= 2);
}
