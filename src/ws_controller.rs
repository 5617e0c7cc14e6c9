//! HTTP/WS wiring for the node-serial endpoint. Two thin route handlers
//! (text, binary) share `handle_upgrade`, which runs admission, completes
//! the WS handshake, and spawns the task that pumps bytes between the WS
//! peer and the `Gateway` until either side closes.

use std::sync::Arc;

use actix_web::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::{CloseCode, CloseReason, Message};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::admission::{self, Admitted};
use crate::api::AuthApi;
use crate::domain::{Experiment, Mode, Node, Site};
use crate::gateway::Gateway;
use crate::session::{Outbound, Session};

type PathParams = (String, String, String);

/// `GET /ws/{site}/{experiment}/{node}/serial`, text mode.
pub async fn serial_text(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<PathParams>,
    gateway: web::Data<Arc<Gateway>>,
    auth_api: web::Data<Arc<dyn AuthApi>>,
) -> Result<HttpResponse, Error> {
    handle_upgrade(req, stream, path, Mode::Text, gateway, auth_api).await
}

/// `GET /ws/{site}/{experiment}/{node}/serial/raw`, binary mode.
pub async fn serial_raw(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<PathParams>,
    gateway: web::Data<Arc<Gateway>>,
    auth_api: web::Data<Arc<dyn AuthApi>>,
) -> Result<HttpResponse, Error> {
    handle_upgrade(req, stream, path, Mode::Binary, gateway, auth_api).await
}

async fn handle_upgrade(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<PathParams>,
    mode: Mode,
    gateway: web::Data<Arc<Gateway>>,
    auth_api: web::Data<Arc<dyn AuthApi>>,
) -> Result<HttpResponse, Error> {
    let (site_raw, experiment_raw, node_raw) = path.into_inner();
    // The route's regex-constrained segments already guarantee these parse;
    // re-parsing here just gets us the validated newtypes without
    // duplicating the character classes.
    let site = Site::parse(&site_raw).expect("route regex guarantees a valid site");
    let experiment =
        Experiment::parse(&experiment_raw).expect("route regex guarantees a valid experiment");
    let node = Node::parse(&node_raw).expect("route regex guarantees a valid node");

    let protocol_header = req
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|h| h.to_str().ok());

    let admitted: Admitted = admission::admit(
        protocol_header,
        site,
        experiment,
        node,
        mode,
        auth_api.get_ref().as_ref(),
    )
    .await?;

    let (mut response, ws_session, msg_stream) = actix_ws::handle(&req, stream)?;
    response.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static("token"),
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let domain_session = Session::new(
        admitted.user,
        admitted.site,
        admitted.experiment,
        admitted.node,
        admitted.mode,
        tx,
    );

    let gateway = gateway.get_ref().clone();
    let pump_session = domain_session.clone();
    gateway.attach(domain_session);

    actix_web::rt::spawn(pump(gateway, pump_session, ws_session, msg_stream, rx));

    Ok(response)
}

fn ws_close_code(code: u16) -> CloseCode {
    match code {
        1000 => CloseCode::Normal,
        1001 => CloseCode::Away,
        other => CloseCode::Iana(other),
    }
}

/// Bridges one WS connection to the `Gateway` until either side closes.
async fn pump(
    gateway: Arc<Gateway>,
    session: Session,
    mut ws_session: actix_ws::Session,
    mut msg_stream: actix_ws::MessageStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let node = session.node.clone();
    let user = session.user.clone();
    let session_id = session.id();
    let mode = session.mode;

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Text(text)) => {
                        if ws_session.text(text).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Binary(bytes)) => {
                        if ws_session.binary(bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close { code, reason }) => {
                        let _ = ws_session
                            .close(Some(CloseReason {
                                code: ws_close_code(code),
                                description: Some(reason),
                            }))
                            .await;
                        break;
                    }
                    None => break,
                }
            }
            msg = msg_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if mode.is_text() {
                            gateway.handle_ws_message(&session, text.as_bytes().to_vec());
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if !mode.is_text() {
                            gateway.handle_ws_message(&session, bytes.to_vec());
                        }
                    }
                    Some(Ok(Message::Ping(bytes))) => {
                        if ws_session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(%node, %err, "ws protocol error, closing session");
                        break;
                    }
                }
            }
        }
    }

    debug!(%node, %user, "session detached");
    gateway.detach(session_id, &node, &user);
}
