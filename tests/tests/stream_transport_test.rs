//! Exchanges over a real TCP connection to an echoing node

use meshwork_host::{
    Dispatcher, Frame, ProtocolMessage, StreamTransport, Transport, TransportError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

// Serves one connection: a stray frame first, then answers each request,
// with every reply split across two writes.
async fn serve_one(listener: TcpListener) {
    let (socket, _) = listener.accept().await.unwrap();
    let (reader, mut writer) = socket.into_split();
    let requests = StreamTransport::new(reader, tokio::io::sink());

    writer
        .write_all(&ProtocolMessage::Ok.encode(200).unwrap().to_bytes().unwrap())
        .await
        .unwrap();

    loop {
        let frame = match requests.receive(Duration::from_secs(5)).await {
            Ok(frame) => frame,
            Err(TransportError::Closed) | Err(TransportError::Timeout) => return,
            Err(e) => panic!("node read failed: {}", e),
        };
        let reply = match ProtocolMessage::decode(&frame).unwrap() {
            ProtocolMessage::Send { .. } => ProtocolMessage::SendAck { nhops: 3 },
            ProtocolMessage::ZcId => ProtocolMessage::ZcIdRes {
                serial: vec![1, 2, 3, 4, 5, 6],
            },
            _ => ProtocolMessage::Ok,
        };
        let bytes = reply.encode(frame.seq).unwrap().to_bytes().unwrap();
        let (head, tail) = bytes.split_at(2);
        writer.write_all(head).await.unwrap();
        writer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        writer.write_all(tail).await.unwrap();
    }
}

#[tokio::test]
async fn test_exchanges_over_tcp() {
    let _ = env_logger::builder().is_test(true).try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let node = tokio::spawn(serve_one(listener));

    let transport = StreamTransport::connect(&address, Duration::from_secs(1))
        .await
        .unwrap();
    // Give the stray frame time to arrive so the first drain sees it
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut dispatcher = Dispatcher::new(Arc::new(transport), Duration::from_secs(1));
    let response = dispatcher.exchange(ProtocolMessage::ZcId).await.unwrap();
    assert_eq!(
        response,
        ProtocolMessage::ZcIdRes {
            serial: vec![1, 2, 3, 4, 5, 6]
        }
    );

    let response = dispatcher
        .exchange(ProtocolMessage::Send {
            dst: 4,
            port: 5,
            data: vec![0xCA, 0xFE, 0xBA, 0xBE],
        })
        .await
        .unwrap();
    assert_eq!(response, ProtocolMessage::SendAck { nhops: 3 });
    assert_eq!(dispatcher.metrics().drained_frames, 1);

    drop(dispatcher);
    node.await.unwrap();
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let result = StreamTransport::connect(&address, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(TransportError::Io(_))));
}

#[tokio::test]
async fn test_peer_close_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let node = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let transport = StreamTransport::connect(&address, Duration::from_secs(1))
        .await
        .unwrap();
    node.await.unwrap();

    let result = transport.receive(Duration::from_secs(1)).await;
    assert!(matches!(result, Err(TransportError::Closed)));
}

#[tokio::test]
async fn test_oversized_frame_is_rejected_before_writing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let _node = tokio::spawn(async move { listener.accept().await });

    let transport = StreamTransport::connect(&address, Duration::from_secs(1))
        .await
        .unwrap();
    let result = transport.send(&Frame::new(1, 24, vec![0; 300])).await;
    assert!(matches!(result, Err(TransportError::Frame(_))));
}
