//! WebSocket transport for the live tail at `/entries/live`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{future, SinkExt, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LiveTailError, ServerError};
use crate::live::{LiveBatch, LiveQuery, LiveTail};
use crate::state::ServerState;

/// Handle WebSocket upgrade request for /entries/live.
pub async fn live_upgrade(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    if !state.add_live_connection() {
        let current = state.live_connection_count();
        let max = state.config().max_live_connections;
        return Err(ServerError::TooManyConnections(current, max));
    }

    Ok(ws.on_upgrade(move |socket| handle_live_connection(socket, state)))
}

/// Handle an active live-tail connection.
async fn handle_live_connection(socket: WebSocket, state: Arc<ServerState>) {
    let connection = Uuid::new_v4();
    info!(connection = %connection, "Live tail connected");

    let (sink, stream) = socket.split();
    let mut reader = stream.filter_map(|msg| future::ready(decode(msg)));
    let mut writer = sink.with(|batch: LiveBatch| future::ready(encode(&batch)));

    let tail = LiveTail::new(state.searcher(), state.config().live_tail.clone());
    let cancel = state.shutdown_token().child_token();
    tail.run(&mut reader, &mut writer, cancel).await;

    if let Err(e) = writer.close().await {
        debug!(connection = %connection, error = %e, "Close failed");
    }
    state.remove_live_connection();
    info!(connection = %connection, "Live tail disconnected");
}

/// Maps an incoming frame to a client query.
///
/// Control frames are dropped; a close frame or socket error ends the reader.
fn decode(msg: Result<Message, axum::Error>) -> Option<Result<LiveQuery, LiveTailError>> {
    match msg {
        Ok(Message::Text(text)) => Some(serde_json::from_str(text.as_str()).map_err(Into::into)),
        Ok(Message::Binary(data)) => Some(serde_json::from_slice(&data).map_err(Into::into)),
        Ok(Message::Ping(_) | Message::Pong(_)) => None,
        Ok(Message::Close(_)) => Some(Err(LiveTailError::Closed)),
        Err(e) => Some(Err(e.into())),
    }
}

fn encode(batch: &LiveBatch) -> Result<Message, LiveTailError> {
    Ok(Message::Text(serde_json::to_string(batch)?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use logscope_core::LogEntry;

    #[test]
    fn decode_text_query() {
        let msg = Message::Text(r#"{"q":"level:error"}"#.into());
        let query = decode(Ok(msg)).unwrap().unwrap();
        assert_eq!(query.q, "level:error");
        assert!(query.since.is_none());
    }

    #[test]
    fn decode_binary_query() {
        let msg = Message::Binary(Bytes::from_static(br#"{"q":"boom"}"#));
        assert_eq!(decode(Ok(msg)).unwrap().unwrap().q, "boom");
    }

    #[test]
    fn decode_skips_control_frames() {
        assert!(decode(Ok(Message::Ping(Bytes::new()))).is_none());
        assert!(decode(Ok(Message::Pong(Bytes::new()))).is_none());
    }

    #[test]
    fn decode_close_and_garbage_end_reader() {
        assert!(matches!(
            decode(Ok(Message::Close(None))),
            Some(Err(LiveTailError::Closed))
        ));
        assert!(matches!(
            decode(Ok(Message::Text("not json".into()))),
            Some(Err(LiveTailError::Codec(_)))
        ));
    }

    #[test]
    fn encode_batch_as_text() {
        let msg = encode(&LiveBatch::entries(vec![LogEntry::new("hi")])).unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text frame");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(json["entries"][0]["message"], "hi");
    }
}
