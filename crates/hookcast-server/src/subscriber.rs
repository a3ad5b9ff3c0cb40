//! WebSocket subscriber lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

use crate::registry::{ConnectionRegistry, Subscriber, SubscriberError};

/// Write half of an upgraded WebSocket, owned by the registry.
pub struct WsSubscriber {
    sink: SplitSink<WebSocket, WsMessage>,
}

impl WsSubscriber {
    pub fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send_text(&mut self, payload: &str) -> Result<(), SubscriberError> {
        self.sink
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| SubscriberError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        // Best effort: the peer may already be gone.
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

/// Register an upgraded socket and hold it until the peer goes away.
///
/// Inbound frames are discarded; the read loop exists only to notice the
/// remote side closing or erroring.
pub async fn handle_ws_connection(socket: WebSocket, registry: Arc<ConnectionRegistry>) {
    let (sink, mut stream) = socket.split();
    let conn_id = registry.register(Box::new(WsSubscriber::new(sink))).await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => tracing::trace!(conn_id = %conn_id, "discarding inbound frame"),
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "subscriber read error");
                break;
            }
        }
    }

    registry.unregister(&conn_id).await;
}
