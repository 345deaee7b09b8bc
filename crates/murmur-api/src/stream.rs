//! `GET /rooms/{id}/stream`: live deliveries over a WebSocket.
//!
//! Membership is checked and the subscription opened before the upgrade, so
//! a rejected caller gets an ordinary JSON error. Each frame is a JSON text
//! message tagged by `type`:
//!
//! - `message`: a delivered message with sender display, in id order.
//! - `resync`: deliveries were dropped; re-read history and reconnect. The
//!   server closes the socket right after.
//! - `ping`: keepalive.

use std::{fmt, sync::Arc, time::Duration};

use axum::{
  extract::{
    Path, State, WebSocketUpgrade,
    ws::Message as WsMessage,
  },
  response::Response,
};
use futures_util::{Sink, SinkExt as _, Stream, StreamExt as _};
use murmur_chat::{ChatService, Delivery, MessageView, Subscription, directory};
use murmur_core::{account::AccountDirectory, store::ChatStore};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{caller::Caller, error::ApiError};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// One outbound frame.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
  Message(MessageView),
  Resync,
  Ping,
}

/// `GET /rooms/{id}/stream`
pub async fn handler<S, D>(
  State(chat): State<Arc<ChatService<S, D>>>,
  Caller(caller): Caller,
  Path(room_id): Path<Uuid>,
  ws: WebSocketUpgrade,
) -> Result<Response, ApiError>
where
  S: ChatStore + 'static,
  D: AccountDirectory + 'static,
{
  let subscription = chat.subscribe(room_id, &caller).await?;
  tracing::info!(%room_id, account = %caller, "stream opened");
  Ok(ws.on_upgrade(move |socket| {
    let (sender, receiver) = socket.split();
    pump(sender, receiver, chat, subscription)
  }))
}

/// Forward deliveries to `sender` until the client leaves, the subscription
/// ends, or a resync has been announced.
async fn pump<S, D, W, R, E>(
  mut sender: W,
  mut receiver: R,
  chat: Arc<ChatService<S, D>>,
  mut subscription: Subscription,
) where
  S: ChatStore,
  D: AccountDirectory,
  W: Sink<WsMessage> + Unpin,
  R: Stream<Item = Result<WsMessage, E>> + Unpin,
  E: fmt::Display,
{
  let room_id = subscription.room_id();
  let mut ping = tokio::time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);

  loop {
    tokio::select! {
      delivery = subscription.recv() => {
        let (frame, last) = match delivery {
          Some(Delivery::Message(message)) => {
            let view = directory::enrich(chat.directory(), vec![message]).await;
            match view.into_iter().next() {
              Some(view) => (StreamFrame::Message(view), false),
              None => continue,
            }
          }
          Some(Delivery::Resync) => (StreamFrame::Resync, true),
          None => break,
        };
        if send_frame(&mut sender, &frame).await.is_err() || last {
          break;
        }
      }

      incoming = receiver.next() => match incoming {
        Some(Ok(WsMessage::Close(_))) | None => break,
        Some(Err(e)) => {
          tracing::warn!(%room_id, "stream receive error: {e}");
          break;
        }
        Some(Ok(_)) => {}
      },

      _ = ping.tick() => {
        if send_frame(&mut sender, &StreamFrame::Ping).await.is_err() {
          break;
        }
      }
    }
  }

  let _ = sender.close().await;
  tracing::info!(%room_id, token = %subscription.token(), "stream closed");
}

async fn send_frame<W>(sender: &mut W, frame: &StreamFrame) -> Result<(), ()>
where
  W: Sink<WsMessage> + Unpin,
{
  let json = match serde_json::to_string(frame) {
    Ok(json) => json,
    Err(e) => {
      tracing::warn!("failed to serialize stream frame: {e}");
      return Ok(());
    }
  };
  sender.send(WsMessage::Text(json.into())).await.map_err(|_| ())
}
