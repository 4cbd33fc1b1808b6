//! WebSocket API server
//!
//! Thin transport over `SceneService`: each inbound client message maps to
//! one logical operation, each outcome to one server event. Polling cadence
//! for sensors and camera frames is a client concern.

use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use neoscene_core::assets::AssetCatalog;
use neoscene_core::llm::LlmClient;
use neoscene_core::protocol::{
    ClientMessage, MessageEnvelope, ServerEvent, ServerInfo,
};
use neoscene_core::sim::KinematicBackend;
use neoscene_core::{Config, NeosceneError, SceneService};

pub async fn start_server(config: Config) -> Result<()> {
    let catalog = Arc::new(
        AssetCatalog::new(&config.assets.root)
            .context("Failed to load asset catalog")?,
    );
    let llm = Arc::new(LlmClient::from_config(&config.llm).context("Failed to build LLM client")?);
    let backend = Arc::new(KinematicBackend::new());

    let service = Arc::new(SceneService::new(&config, catalog, llm, backend));
    let evictor = service.start_eviction(&config);

    let addr = format!("127.0.0.1:{}", config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("neoscene server listening on: ws://{}", addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };
                let service = service.clone();
                tokio::spawn(async move {
                    if let Ok(ws_stream) = accept_async(stream).await {
                        handle_connection(ws_stream, service).await;
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down, releasing sessions...");
                evictor.cancel();
                service.shutdown().await;
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    ws_stream: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    service: Arc<SceneService>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Task forwarding ServerEvents to the socket
    let send_task = tokio::spawn(async move {
        let mut event_id = 0u64;
        while let Some(event) = rx.recv().await {
            event_id += 1;
            let envelope = MessageEnvelope::event(event_id, event);
            if let Ok(json) = serde_json::to_string(&envelope) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        if let Message::Text(text) = msg {
            if let Ok(envelope) = serde_json::from_str::<MessageEnvelope<ClientMessage>>(text.as_str())
            {
                handle_client_message(envelope.payload, &service, &tx).await;
            }
        }
    }

    send_task.abort();
}

async fn handle_client_message(
    msg: ClientMessage,
    service: &Arc<SceneService>,
    tx: &mpsc::UnboundedSender<ServerEvent>,
) {
    match msg {
        ClientMessage::Hello { .. } => {
            let _ = tx.send(ServerEvent::HelloAck {
                server: ServerInfo {
                    name: "neoscene-server".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
            });
        }

        ClientMessage::ChatTurn {
            session_id,
            message,
        } => match service.chat(session_id, &message).await {
            Ok(outcome) => {
                let scene_spec = outcome
                    .scene_spec
                    .as_ref()
                    .and_then(|s| serde_json::to_value(s).ok());
                let _ = tx.send(ServerEvent::ChatReply {
                    session_id: outcome.session_id,
                    is_new_session: outcome.is_new_session,
                    user_message: outcome.user_message,
                    assistant_message: outcome.assistant_message,
                    scene_summary: outcome.scene_summary,
                    scene_spec,
                });
            }
            Err(e) => send_error(tx, &e),
        },

        ClientMessage::ReadSensors { session_id } => match service.read_sensors(session_id) {
            Ok(snapshot) => {
                let values = serde_json::to_value(&snapshot.values)
                    .unwrap_or_else(|_| serde_json::json!({}));
                let _ = tx.send(ServerEvent::Sensors {
                    session_id,
                    values,
                    sim_time: snapshot.sim_time,
                    stale: snapshot.stale,
                });
            }
            Err(e) => send_error(tx, &e),
        },

        ClientMessage::ReadCamera { session_id, camera } => {
            match service.render_camera(session_id, camera.as_deref()) {
                Ok(frame) => {
                    let data = base64::engine::general_purpose::STANDARD.encode(&frame.data);
                    let _ = tx.send(ServerEvent::CameraFrame {
                        session_id,
                        camera: frame.camera,
                        content_type: frame.content_type,
                        data,
                    });
                }
                // Expected transient state: explicit "no data" keeps the
                // polling contract uniform
                Err(NeosceneError::RenderUnavailable { reason }) => {
                    let _ = tx.send(ServerEvent::CameraUnavailable { session_id, reason });
                }
                Err(e) => send_error(tx, &e),
            }
        }

        ClientMessage::SetControl {
            session_id,
            throttle,
            steering,
        } => match service.set_control(session_id, throttle, steering) {
            Ok(applied) => {
                let _ = tx.send(ServerEvent::ControlAck {
                    session_id,
                    throttle: applied.throttle,
                    steering: applied.steering,
                });
            }
            Err(e) => send_error(tx, &e),
        },

        ClientMessage::DescribeSession { session_id } => {
            match service.registry().get(session_id) {
                Ok(session) => {
                    let _ = tx.send(ServerEvent::SessionInfo {
                        session_id,
                        created_at: session.created_at().to_rfc3339(),
                        last_active: session.last_active().to_rfc3339(),
                        scene_summary: session.summary(),
                        simulation_running: session.has_worker(),
                    });
                }
                Err(e) => send_error(tx, &e),
            }
        }
    }
}

fn send_error(tx: &mpsc::UnboundedSender<ServerEvent>, error: &NeosceneError) {
    let _ = tx.send(ServerEvent::Error {
        code: error.code().to_string(),
        message: error.user_message(),
    });
}
