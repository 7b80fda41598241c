//! Rebinding the content listener while downloads are in flight.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use gitmirror_daemon::ContentServerManager;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

const CLIENTS: usize = 50;
const FILE_SIZE: usize = 4 * 1024 * 1024;

fn site(file: &str, content: &[u8]) -> TempDir {
    let dir = TempDir::new().expect("site dir");
    std::fs::write(dir.path().join(file), content).expect("write site file");
    dir
}

async fn open_request(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("send request");
    stream
}

/// Read the rest of a response until EOF or reset, returning
/// (head, body byte count, body all `fill`).
async fn finish(stream: &mut TcpStream, mut received: Vec<u8>, fill: u8) -> (String, usize, bool) {
    let mut chunk = vec![0u8; 64 * 1024];
    let mut head_end = None;
    let mut body_len = 0usize;
    let mut uniform = true;
    loop {
        if head_end.is_none() {
            if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                head_end = Some(pos + 4);
                let body = &received[pos + 4..];
                body_len += body.len();
                uniform &= body.iter().all(|b| *b == fill);
            }
        }
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if head_end.is_some() {
            body_len += n;
            uniform &= chunk[..n].iter().all(|b| *b == fill);
        } else {
            received.extend_from_slice(&chunk[..n]);
        }
    }
    let head = head_end
        .map(|end| String::from_utf8_lossy(&received[..end]).into_owned())
        .unwrap_or_default();
    (head, body_len, uniform)
}

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = open_request(addr, path).await;
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    response
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rebind_drains_in_flight_downloads() {
    let old_root = site("big.bin", &vec![b'a'; FILE_SIZE]);
    let new_root = site("big.bin", &vec![b'b'; FILE_SIZE]);
    std::fs::write(new_root.path().join("index.html"), "fresh").unwrap();

    let manager = ContentServerManager::new(Duration::from_secs(20))
        .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let first = manager.rebind(old_root.path(), 0).await.expect("initial bind");
    let addr = SocketAddr::from(([127, 0, 0, 1], first.addr.port()));

    let (started_tx, mut started_rx) = mpsc::channel::<()>(CLIENTS);
    let (release_tx, release_rx) = watch::channel(false);

    let mut clients = Vec::with_capacity(CLIENTS);
    for _ in 0..CLIENTS {
        let started = started_tx.clone();
        let mut release = release_rx.clone();
        clients.push(tokio::spawn(async move {
            let mut stream = open_request(addr, "/big.bin").await;
            let mut first_chunk = vec![0u8; 1024];
            let n = stream.read(&mut first_chunk).await.expect("first chunk");
            first_chunk.truncate(n);
            started.send(()).await.expect("report start");

            drop(release.wait_for(|released| *released).await.expect("release signal"));
            finish(&mut stream, first_chunk, b'a').await
        }));
    }
    drop(started_tx);
    for _ in 0..CLIENTS {
        started_rx.recv().await.expect("client started");
    }

    let rebound = manager
        .rebind(new_root.path(), addr.port())
        .await
        .expect("rebind");
    assert_eq!(rebound.addr.port(), addr.port());

    let fresh = get(addr, "/index.html").await;
    assert!(fresh.starts_with("HTTP/1.1 200"), "{fresh}");
    assert!(fresh.ends_with("fresh"), "new root must serve after rebind: {fresh}");

    release_tx.send(true).expect("release clients");
    for client in clients {
        let (head, body_len, uniform) = client.await.expect("client task");
        assert!(head.starts_with("HTTP/1.1 200"), "{head}");
        assert_eq!(body_len, FILE_SIZE, "download was cut short");
        assert!(uniform, "download mixed content from both roots");
    }

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connections_outliving_grace_period_are_closed() {
    const LARGE: usize = 32 * 1024 * 1024;
    let old_root = site("big.bin", &vec![b'a'; LARGE]);
    let new_root = site("index.html", b"fresh");

    let manager = ContentServerManager::new(Duration::from_millis(300))
        .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let first = manager.rebind(old_root.path(), 0).await.expect("initial bind");
    let addr = SocketAddr::from(([127, 0, 0, 1], first.addr.port()));

    let mut stream = open_request(addr, "/big.bin").await;
    let mut first_chunk = vec![0u8; 1024];
    let n = stream.read(&mut first_chunk).await.expect("first chunk");
    first_chunk.truncate(n);

    manager
        .rebind(new_root.path(), addr.port())
        .await
        .expect("rebind");
    tokio::time::sleep(Duration::from_secs(3)).await;

    let (head, body_len, uniform) = finish(&mut stream, first_chunk, b'a').await;
    assert!(head.starts_with("HTTP/1.1 200"), "{head}");
    assert!(uniform);
    assert!(
        body_len < LARGE,
        "slow download outlived the grace period ({body_len} bytes)"
    );

    let fresh = get(addr, "/index.html").await;
    assert!(fresh.ends_with("fresh"), "{fresh}");
    manager.shutdown().await;
}

#[tokio::test]
async fn rebind_after_shutdown_starts_fresh_listener() {
    let root = site("index.html", b"again");
    let manager = ContentServerManager::new(Duration::from_secs(1))
        .with_host(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let info = manager.rebind(root.path(), 0).await.expect("bind");
    manager.shutdown().await;
    assert!(manager.current().await.is_none());

    let again = manager
        .rebind(root.path(), info.addr.port())
        .await
        .expect("bind again");
    let response = get(SocketAddr::from(([127, 0, 0, 1], again.addr.port())), "/").await;
    assert!(response.ends_with("again"), "{response}");
    manager.shutdown().await;
}
