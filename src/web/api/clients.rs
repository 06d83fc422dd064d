//! HTTP endpoints for the rendezvous protocol.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::error::Error;
use crate::protocol::{ClientList, Environment, PollOutcome, Rendezvous};

/// Body of every successful mutation.
pub const OK_BODY: &str = "ok\r\n";

/// Body of a poll that timed out.
pub const TIMEOUT_BODY: &str = "timeout\r\n";

/// POST /register/:name
pub async fn register_client(
    State(rendezvous): State<Rendezvous>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<&'static str, Error> {
    rendezvous.register(&name, Environment::new(body))?;
    Ok(OK_BODY)
}

/// GET /listen/:name
pub async fn listen(
    State(rendezvous): State<Rendezvous>,
    Path(name): Path<String>,
) -> Result<Response, Error> {
    let response = match rendezvous.poll(&name).await? {
        PollOutcome::Payload(payload) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            payload,
        )
            .into_response(),
        PollOutcome::Timeout => (StatusCode::REQUEST_TIMEOUT, TIMEOUT_BODY).into_response(),
    };
    Ok(response)
}

/// POST /send/:name
pub async fn send_command(
    State(rendezvous): State<Rendezvous>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<&'static str, Error> {
    rendezvous.send(&name, body)?;
    Ok(OK_BODY)
}

/// GET /clients/
pub async fn list_clients(State(rendezvous): State<Rendezvous>) -> Json<ClientList> {
    Json(ClientList {
        clients: rendezvous.list(),
    })
}

/// DELETE /clients/:name
pub async fn remove_client(
    State(rendezvous): State<Rendezvous>,
    Path(name): Path<String>,
) -> Result<&'static str, Error> {
    rendezvous.remove(&name)?;
    Ok(OK_BODY)
}
