use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pollroom_core::connection::{ConnectionLifecycle, Delivery, Flow};
use pollroom_core::events::ServerEvent;
use pollroom_core::{observability, AppState};
use pollroom_models::gateway::{encode_frame, ClientCommand};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);
const INBOUND_QUEUE_SIZE: usize = 64;
const CLOSE_CODE_KICKED: u16 = 4001;

pub(crate) async fn handle_connection(socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let coordinator = state.coordinator.clone();
    let mut events = coordinator.event_bus().register_session(session_id.clone());
    observability::ws_connection_open();
    tracing::debug!(%session_id, "gateway connection opened");

    let (mut sink, stream) = socket.split();
    let (command_tx, mut commands) = mpsc::channel(INBOUND_QUEUE_SIZE);
    let reader = tokio::spawn(read_commands(stream, command_tx, session_id.clone()));

    let mut lifecycle = ConnectionLifecycle::new(session_id.clone(), coordinator.clone());

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Skip the first immediate tick.
    keepalive.tick().await;

    loop {
        tokio::select! {
            maybe_command = commands.recv() => {
                // The reader only stops when the socket is gone.
                let Some(command) = maybe_command else { break };
                if lifecycle.handle_command(command).await == Flow::Close {
                    break;
                }
            }
            received = events.recv() => match received {
                Ok(event) => {
                    let delivery = lifecycle.on_event(&event);
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                    if delivery == Delivery::ForwardAndClose {
                        let _ = sink
                            .send(Message::Close(Some(CloseFrame {
                                code: CLOSE_CODE_KICKED,
                                reason: "kicked out".into(),
                            })))
                            .await;
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%session_id, skipped, "gateway session lagging, events skipped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = keepalive.tick() => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    tracing::debug!(%session_id, "keepalive ping failed");
                    break;
                }
            }
        }
    }

    reader.abort();
    lifecycle.disconnect();
    coordinator.event_bus().unregister_session(&session_id);
    observability::ws_connection_close();
    tracing::debug!(%session_id, "gateway connection closed");
}

async fn read_commands(
    mut stream: SplitStream<WebSocket>,
    commands: mpsc::Sender<ClientCommand>,
    session_id: String,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(%session_id, "gateway read error: {e}");
                break;
            }
        };
        match decode_command(text.as_str()) {
            Ok(command) => {
                tracing::trace!(%session_id, command = command.name(), "gateway command");
                if commands.send(command).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::debug!(%session_id, "ignoring malformed frame: {e}"),
        }
    }
}

fn decode_command(text: &str) -> Result<ClientCommand, serde_json::Error> {
    serde_json::from_str(text)
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let frame = match encode_frame(&event.event_type, &event.payload) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(event_type = %event.event_type, "failed to encode gateway frame: {e}");
            return Ok(());
        }
    };
    sink.send(Message::Text(frame.into())).await
}
