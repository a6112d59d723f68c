//! End-to-end proxy tests with a mock clamd backend

use clamd_filter::filter::strip_variant_prefix;
use clamd_filter::logging::{AuditSink, JsonlWriter};
use clamd_filter::pool::{BufferClass, BufferPool};
use clamd_filter::protocol::{REJECTION_RESPONSE, read_command};
use clamd_filter::relay::{Backend, Proxy, Server};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

/// What the mock backend saw
#[derive(Default)]
struct Received {
    commands: Mutex<Vec<String>>,
    streams: Mutex<Vec<Vec<u8>>>,
}

/// Start a mock clamd that answers PING, VERSION and INSTREAM
async fn start_mock_clamd() -> (SocketAddr, Arc<Received>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Received::default());

    let seen = Arc::clone(&received);
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };

            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let (rd, mut wr) = stream.into_split();
                let mut reader = BufReader::new(rd);
                let pool = BufferPool::new(BufferClass::Command);

                while let Ok(command) = read_command(&mut reader, &pool).await {
                    let name = command.name_str().into_owned();
                    seen.commands.lock().unwrap().push(name.clone());

                    let mut reply = match strip_variant_prefix(&name) {
                        "PING" => b"PONG".to_vec(),
                        "VERSION" => b"ClamAV 1.4.1/27400".to_vec(),
                        "INSTREAM" => {
                            let mut payload = Vec::new();
                            loop {
                                let mut len = [0u8; 4];
                                if reader.read_exact(&mut len).await.is_err() {
                                    return;
                                }
                                let len = u32::from_be_bytes(len) as usize;
                                if len == 0 {
                                    break;
                                }
                                let mut data = vec![0u8; len];
                                if reader.read_exact(&mut data).await.is_err() {
                                    return;
                                }
                                payload.extend_from_slice(&data);
                            }
                            seen.streams.lock().unwrap().push(payload);
                            b"stream: OK".to_vec()
                        }
                        _ => b"UNKNOWN COMMAND".to_vec(),
                    };
                    reply.push(command.delimiter.as_byte());

                    if wr.write_all(&reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, received)
}

/// Start the proxy in front of `backend`
async fn start_proxy(
    backend: SocketAddr,
    audit: Option<AuditSink>,
) -> (SocketAddr, watch::Sender<bool>) {
    let mut server = Server::new("127.0.0.1:0");
    server.bind().await.unwrap();
    let addr = server.local_addr().unwrap();

    let proxy = Arc::new(Proxy::new(Backend::new(backend.to_string())).with_audit(audit));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        server
            .run(
                move |stream| {
                    let proxy = Arc::clone(&proxy);
                    async move { proxy.handle_client(stream).await }
                },
                shutdown_rx,
            )
            .await
    });

    (addr, shutdown_tx)
}

async fn read_exactly(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for response")
        .unwrap();
    buf
}

fn instream_request(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut request = b"zINSTREAM\0".to_vec();
    for chunk in chunks {
        request.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
        request.extend_from_slice(chunk);
    }
    request.extend_from_slice(&[0, 0, 0, 0]);
    request
}

#[tokio::test]
async fn test_ping_pong() {
    let (backend, received) = start_mock_clamd().await;
    let (proxy, _shutdown) = start_proxy(backend, None).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"zPING\0").await.unwrap();
    assert_eq!(read_exactly(&mut client, 5).await, b"PONG\0");

    client.write_all(b"PING\n").await.unwrap();
    assert_eq!(read_exactly(&mut client, 5).await, b"PONG\n");

    assert_eq!(*received.commands.lock().unwrap(), vec!["zPING", "PING"]);
}

#[tokio::test]
async fn test_reload_rejected_then_ping_forwarded() {
    let (backend, received) = start_mock_clamd().await;
    let (proxy, _shutdown) = start_proxy(backend, None).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"RELOAD\n").await.unwrap();
    assert_eq!(
        read_exactly(&mut client, REJECTION_RESPONSE.len()).await,
        REJECTION_RESPONSE
    );

    client.write_all(b"nPING\n").await.unwrap();
    assert_eq!(read_exactly(&mut client, 5).await, b"PONG\n");

    // The backend never saw RELOAD
    assert_eq!(*received.commands.lock().unwrap(), vec!["nPING"]);
}

#[tokio::test]
async fn test_admin_and_scan_commands_rejected() {
    let (backend, received) = start_mock_clamd().await;
    let (proxy, _shutdown) = start_proxy(backend, None).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    for command in [
        &b"zSHUTDOWN\0"[..],
        b"SCAN /etc/shadow\n",
        b"nCONTSCAN /\n",
        b"zSTATS\0",
    ] {
        client.write_all(command).await.unwrap();
        assert_eq!(
            read_exactly(&mut client, REJECTION_RESPONSE.len()).await,
            REJECTION_RESPONSE
        );
    }

    client.write_all(b"zVERSION\0").await.unwrap();
    let expected = b"ClamAV 1.4.1/27400\0";
    assert_eq!(read_exactly(&mut client, expected.len()).await, expected);

    assert_eq!(*received.commands.lock().unwrap(), vec!["zVERSION"]);
}

#[tokio::test]
async fn test_instream_small_and_large_chunks() {
    let (backend, received) = start_mock_clamd().await;
    let (proxy, _shutdown) = start_proxy(backend, None).await;

    let mut rng = rand::thread_rng();
    let small: Vec<u8> = (0..1024).map(|_| rng.r#gen()).collect();
    let large: Vec<u8> = (0..100 * 1024).map(|_| rng.r#gen()).collect();

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(&instream_request(&[small.clone(), large.clone()]))
        .await
        .unwrap();

    let expected = b"stream: OK\0";
    assert_eq!(read_exactly(&mut client, expected.len()).await, expected);

    let mut payload = small;
    payload.extend_from_slice(&large);
    assert_eq!(*received.streams.lock().unwrap(), vec![payload]);

    // Commands are parsed again once the stream has ended
    client.write_all(b"zPING\0").await.unwrap();
    assert_eq!(read_exactly(&mut client, 5).await, b"PONG\0");
}

#[tokio::test]
async fn test_instream_many_chunks() {
    let (backend, received) = start_mock_clamd().await;
    let (proxy, _shutdown) = start_proxy(backend, None).await;

    let chunks: Vec<Vec<u8>> = (0..250u32)
        .map(|i| vec![(i % 256) as u8; 100 + i as usize])
        .collect();
    let expected_payload: Vec<u8> = chunks.iter().flatten().copied().collect();

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&instream_request(&chunks)).await.unwrap();

    let expected = b"stream: OK\0";
    assert_eq!(read_exactly(&mut client, expected.len()).await, expected);
    assert_eq!(*received.streams.lock().unwrap(), vec![expected_payload]);
}

#[tokio::test]
async fn test_backend_unavailable_closes_client() {
    let dead_backend = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (proxy, _shutdown) = start_proxy(dead_backend, None).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("client connection was not closed")
        .unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_concurrent_clients() {
    let (backend, _received) = start_mock_clamd().await;
    let (proxy, _shutdown) = start_proxy(backend, None).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(proxy).await.unwrap();
            for _ in 0..10 {
                client.write_all(b"zPING\0").await.unwrap();
                assert_eq!(read_exactly(&mut client, 5).await, b"PONG\0");
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_audit_log_records_decisions() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("audit.jsonl");
    let (audit, _writer_task) = AuditSink::start(JsonlWriter::new(&log_path).unwrap());

    let (backend, _received) = start_mock_clamd().await;
    let (proxy, _shutdown) = start_proxy(backend, Some(audit)).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(b"RELOAD\n").await.unwrap();
    read_exactly(&mut client, REJECTION_RESPONSE.len()).await;
    client.write_all(b"zPING\0").await.unwrap();
    read_exactly(&mut client, 5).await;
    drop(client);

    // The disconnect event is written once the session has wound down
    let content = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let content = std::fs::read_to_string(&log_path).unwrap_or_default();
            if content.contains("\"kind\":\"client_disconnect\"") {
                return content;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("audit log never recorded the disconnect");

    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let blocked = lines
        .iter()
        .find(|e| e["kind"] == "command_blocked")
        .expect("blocked command event");
    assert_eq!(blocked["command"], "RELOAD");
    assert_eq!(blocked["decision"], "denied");

    let allowed = lines
        .iter()
        .find(|e| e["kind"] == "command_allowed")
        .expect("allowed command event");
    assert_eq!(allowed["command"], "zPING");
    assert_eq!(allowed["decision"], "allowed");

    assert!(lines.iter().any(|e| e["kind"] == "client_connect"));
    assert!(
        lines
            .iter()
            .all(|e| e["peer"].as_str().is_some_and(|p| p.starts_with("127.0.0.1:")))
    );
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (backend, _received) = start_mock_clamd().await;
    let (proxy, shutdown) = start_proxy(backend, None).await;

    shutdown.send(true).unwrap();

    // Once the listener is dropped new connections are refused
    let refused = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if TcpStream::connect(proxy).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(refused.is_ok(), "listener still accepting after shutdown");
}
