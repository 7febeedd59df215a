use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

use crate::models::{ClientCommand, ServerEvent};
use crate::services::SessionManager;

/// 绑定地址并开始接受观察者连接
pub async fn run(addr: &str, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("✓ Observer channel listening on ws://{}", addr);
    serve(listener, sessions).await
}

pub async fn serve(listener: TcpListener, sessions: Arc<SessionManager>) -> anyhow::Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let sessions = sessions.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, sessions).await;
                });
            }
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }
}

/// 一个连接对应一个会话，连接结束时释放会话的全部后台任务
async fn handle_connection(stream: TcpStream, peer: SocketAddr, sessions: Arc<SessionManager>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let id = sessions.connect(tx.clone());
    debug!("Session {} bound to {}", id, peer);

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::text(json)).await {
                    debug!("Session {} send failed: {}", id, e);
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientCommand>(text.as_str()) {
                            Ok(command) => sessions.handle_command(id, command).await,
                            Err(e) => {
                                debug!("Session {} sent invalid command: {}", id, e);
                                let _ = tx.send(ServerEvent::error(format!("Invalid command: {}", e)));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            debug!("Session {} pong failed: {}", id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Session {} socket error: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    sessions.disconnect(id).await;
}
