//! WebSocket upgrades relayed through the proxy.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use intercept_proxy::tls::InterceptionPolicy;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

mod common;

/// WebSocket origin echoing every text frame.
async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_text() && ws.send(message).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_websocket_upgrade_is_relayed() {
    let origin = start_echo_origin().await;
    let proxy = common::start_proxy(InterceptionPolicy::new(true, Vec::new()), Vec::new()).await;

    let stream = TcpStream::connect(proxy.addr).await.unwrap();
    let (mut ws, response) =
        tokio_tungstenite::client_async(format!("ws://{origin}/chat"), stream)
            .await
            .unwrap();
    assert_eq!(response.status(), 101);

    for text in ["ping", "second frame"] {
        ws.send(Message::text(text)).await.unwrap();
        let reply = tokio::time::timeout(common::TIMEOUT, ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply, Message::text(text));
    }

    ws.close(None).await.unwrap();
}
