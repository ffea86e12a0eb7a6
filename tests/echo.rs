//! End-to-end echo over length-prefixed framing.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use tcp_server::config::ServerConfig;

mod common;
use common::{read_frame, reads_eof, start_server, wait_until, write_frame, Recorder};

#[tokio::test]
async fn test_echo_round_trip() {
    let recorder = Recorder::echoing();
    let test = start_server(recorder.clone(), ServerConfig::default()).await;

    let mut client = TcpStream::connect(test.addr).await.unwrap();
    write_frame(&mut client, b"0123456789").await;

    assert_eq!(read_frame(&mut client).await, b"0123456789");
    assert_eq!(recorder.messages().len(), 1);

    test.server.close();
}

#[tokio::test]
async fn test_client_close_evicts_connection() {
    let recorder = Recorder::echoing();
    let test = start_server(recorder.clone(), ServerConfig::default()).await;
    let server = test.server.clone();

    let mut client = TcpStream::connect(test.addr).await.unwrap();
    write_frame(&mut client, b"ping").await;
    assert_eq!(read_frame(&mut client).await, b"ping");

    let key = client.local_addr().unwrap().to_string();
    let conn = server.get_connection(&key).expect("registered under peer address");
    assert!(conn.is_open());

    drop(client);

    assert!(wait_until(|| conn.is_closed()).await);
    assert!(wait_until(|| server.get_all_connections().is_empty()).await);
    assert!(wait_until(|| recorder.closes() == 1).await);
    assert_eq!(recorder.close_reasons(), vec!["peer_closed".to_string()]);

    server.close();
}

#[tokio::test]
async fn test_closed_connection_evicted_within_reaper_interval() {
    let test = start_server(Recorder::new(), ServerConfig::default()).await;
    let server = test.server.clone();
    // One reaper interval plus room for the scheduler.
    let bound = server.config().reaper.interval() + Duration::from_millis(25);

    let client = TcpStream::connect(test.addr).await.unwrap();
    let key = client.local_addr().unwrap().to_string();
    assert!(wait_until(|| server.get_connection(&key).is_some()).await);
    let conn = server.get_connection(&key).unwrap();

    let dropped = Instant::now();
    drop(client);
    while !conn.is_closed() {
        assert!(dropped.elapsed() < bound, "not closed after {:?}", dropped.elapsed());
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let closed = Instant::now();
    while server.get_connection(&key).is_some() {
        assert!(closed.elapsed() < bound, "not evicted after {:?}", closed.elapsed());
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    server.close();
}

#[tokio::test]
async fn test_concurrent_clients_get_their_own_replies() {
    let test = start_server(Recorder::echoing(), ServerConfig::default()).await;

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let addr = test.addr;
        tasks.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            for round in 0..5u8 {
                let payload = vec![i, round, i ^ round];
                write_frame(&mut client, &payload).await;
                assert_eq!(read_frame(&mut client).await, payload);
            }
            client
        }));
    }
    let mut clients = Vec::new();
    for task in tasks {
        clients.push(task.await.unwrap());
    }

    let server = test.server.clone();
    assert_eq!(server.get_all_connections().len(), 8);

    server.close();
    assert!(test.serving.await.unwrap().unwrap_err().is_closed());
    assert!(
        wait_until(|| server.get_all_connections().iter().all(|c| c.is_closed())).await
    );
    drop(clients);
}

#[tokio::test]
async fn test_server_close_disconnects_clients() {
    let recorder = Recorder::echoing();
    let test = start_server(recorder.clone(), ServerConfig::default()).await;

    let mut first = TcpStream::connect(test.addr).await.unwrap();
    let mut second = TcpStream::connect(test.addr).await.unwrap();
    write_frame(&mut first, b"a").await;
    write_frame(&mut second, b"b").await;
    read_frame(&mut first).await;
    read_frame(&mut second).await;

    test.server.close();
    test.server.close();

    let result = tokio::time::timeout(Duration::from_secs(2), test.serving)
        .await
        .expect("serve returns after close")
        .unwrap();
    assert!(result.unwrap_err().is_closed());

    assert!(reads_eof(&mut first).await);
    assert!(reads_eof(&mut second).await);
    assert!(wait_until(|| recorder.closes() == 2).await);
    assert_eq!(
        recorder.close_reasons(),
        vec!["local".to_string(), "local".to_string()]
    );

    // The listener is gone with the accept loop.
    assert!(TcpStream::connect(test.addr).await.is_err());
}
