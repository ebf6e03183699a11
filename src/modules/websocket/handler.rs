/// WebSocket HTTP handler
///
/// Upgrades the request and bridges both directions:
/// - Inbound:  client -> socket -> `ClientMessage` -> session actor
/// - Outbound: session actor -> mpsc channel -> socket -> client
use actix::Actor;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::Message;
use tokio::sync::mpsc;

use super::message::ClientMessage;
use super::session::{Disconnect, Realtime, WebSocketSession};

/// GET /ws
///
/// The connection is anonymous until the client sends `auth` with a token.
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    realtime: web::Data<Realtime>,
) -> Result<HttpResponse, Error> {
    tracing::debug!("WebSocket upgrade request from {:?}", req.peer_addr());

    let (response, mut ws_session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let addr = WebSocketSession::new(realtime.get_ref().clone(), tx).start();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                msg = msg_stream.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ClientMessage>(&text) {
                                Ok(client_msg) => addr.do_send(client_msg),
                                Err(e) => {
                                    let raw: String = text.chars().take(100).collect();
                                    tracing::warn!("Cannot parse client message: {} - raw: {}", e, raw);
                                }
                            }
                        }

                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_session.pong(&data).await {
                                tracing::error!("Cannot send pong: {}", e);
                                break;
                            }
                        }

                        Some(Ok(Message::Close(reason))) => {
                            tracing::info!("WebSocket close frame: {:?}", reason);
                            break;
                        }

                        Some(Ok(Message::Binary(_))) => {
                            tracing::warn!("Binary messages are not supported");
                        }

                        Some(Ok(Message::Pong(_) | Message::Continuation(_) | Message::Nop)) => {}

                        Some(Err(e)) => {
                            tracing::error!("WebSocket protocol error: {}", e);
                            break;
                        }

                        None => break,
                    }
                }

                Some(json) = rx.recv() => {
                    if ws_session.text(json).await.is_err() {
                        tracing::error!("Cannot write to WebSocket client");
                        break;
                    }
                }
            }
        }

        addr.do_send(Disconnect);
        let _ = ws_session.close(None).await;
        tracing::debug!("WebSocket message loop finished");
    });

    tracing::info!("WebSocket connection established");
    Ok(response)
}
