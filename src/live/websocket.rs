use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, warn};

use super::codec::engine_url;
use super::{Connector, FrameLink, LiveError};

/// Opens Engine.IO links over a real WebSocket
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<FrameLink, LiveError> {
        let endpoint = engine_url(url);
        debug!("Opening live connection to {}", endpoint);

        let (stream, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| LiveError::Connect(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
                    warn!("Live connection write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        if incoming_tx.send(text.as_str().to_owned()).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Live connection read failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(FrameLink {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}
