//! WebSocket client for the procurement server

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

use crate::messages::{ClientMessage, EntityKind, ServerMessage, SignTarget};

/// Build the stream URL, adding the acting user when given
pub fn stream_url(server: &str, user: Option<Uuid>) -> Result<Url> {
    let mut url = Url::parse(server)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(anyhow!("Server URL must use ws:// or wss://, got {}", url));
    }
    if let Some(user) = user {
        url.query_pairs_mut()
            .append_pair("user_id", &user.to_string());
    }
    Ok(url)
}

pub struct ProcurementClient {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<ServerMessage>,
    #[allow(dead_code)]
    handle: tokio::task::JoinHandle<()>,
}

impl ProcurementClient {
    pub async fn connect(server: &str, user: Option<Uuid>) -> Result<Self> {
        let url = stream_url(server, user)?;
        tracing::info!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(32);
        let (in_tx, in_rx) = mpsc::channel::<ServerMessage>(64);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(msg) = out_rx.recv() => {
                        if write.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Some(result) = read.next() => {
                        match result {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(msg) => {
                                        if in_tx.send(msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse message: {} - {}", e, text);
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => break,
                            Err(e) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    else => break,
                }
            }
        });

        let mut client = Self {
            tx: out_tx,
            rx: in_rx,
            handle,
        };
        match client.recv().await {
            Some(ServerMessage::Connected { .. }) => {
                tracing::info!("Connected successfully");
                Ok(client)
            }
            Some(other) => Err(anyhow!("Unexpected greeting: {:?}", other)),
            None => Err(anyhow!("Connection closed")),
        }
    }

    async fn send(&self, msg: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.tx
            .send(Message::Text(json))
            .await
            .map_err(|e| anyhow!("Failed to send message: {}", e))
    }

    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.rx.recv().await
    }

    /// Restrict the event stream to these kinds; empty means everything
    pub async fn subscribe(&mut self, kinds: Vec<EntityKind>) -> Result<()> {
        self.send(ClientMessage::Subscribe { kinds }).await?;

        while let Some(msg) = self.recv().await {
            match msg {
                ServerMessage::Subscribed { .. } => return Ok(()),
                ServerMessage::Error { message } => {
                    return Err(anyhow!("Server error: {}", message));
                }
                _ => continue,
            }
        }

        Err(anyhow!("Connection closed"))
    }

    /// Sign and wait for the server's verdict
    pub async fn sign(&mut self, target: SignTarget, id: Uuid) -> Result<ServerMessage> {
        self.send(ClientMessage::Sign { target, id }).await?;

        while let Some(msg) = self.recv().await {
            match msg {
                ServerMessage::Signed { .. } => return Ok(msg),
                ServerMessage::Error { message } => {
                    return Err(anyhow!("Server error: {}", message));
                }
                _ => continue,
            }
        }

        Err(anyhow!("Connection closed"))
    }

    /// Listen to incoming messages until the callback returns false
    pub async fn listen<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(ServerMessage) -> bool,
    {
        while let Some(msg) = self.recv().await {
            if !callback(msg) {
                break;
            }
        }
        Ok(())
    }
}
