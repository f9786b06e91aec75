use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::services::Services;
use crate::session::auth::{self, AuthStep};
use crate::session::command::{Command, ParseError};
use crate::session::devices;
use crate::session::dispatch::{handle_payload, SessionCtx};
use crate::supervisor::supervise;

/// Drive one connection: authenticate, then dispatch until either side
/// closes, then tear down the token's bindings.
///
/// `inbound` carries raw client payloads; replies and forwarded
/// notifications are written to `outbound`.
pub async fn run_session(
    services: Services,
    token: String,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
) {
    let Some((handle, reply)) = authenticate(&services, &token, &mut inbound, &outbound).await else {
        tracing::debug!(token = %token, "connection closed before login");
        return;
    };

    // Bind before acknowledging so nothing published after the ack is missed.
    let notes = services.bus.subscribe(&token).await;
    if outbound.send(reply).await.is_err() {
        services.bus.unsubscribe(&token).await;
        if let Err(e) = devices::remove_web_token(&services, &handle, &token).await {
            tracing::error!(user = %handle, "failed to drop web token: {}", e);
        }
        return;
    }
    tracing::info!(user = %handle, token = %token, "session started");
    let inbound = Arc::new(Mutex::new(inbound));
    let notes = Arc::new(Mutex::new(notes));

    let ctx = SessionCtx { services: services.clone(), handle: handle.clone(), token: token.clone() };
    let restarts = supervise("session", || {
        dispatch_loop(ctx.clone(), inbound.clone(), notes.clone(), outbound.clone())
    })
    .await;

    services.bus.unsubscribe(&token).await;
    if let Err(e) = devices::remove_web_token(&services, &handle, &token).await {
        tracing::error!(user = %handle, "failed to drop web token: {}", e);
    }
    tracing::info!(user = %handle, restarts, "session ended");
}

/// Accept only account commands until a login succeeds, returning the
/// handle and the pending acknowledgement. `None` when the connection goes
/// away first.
async fn authenticate(
    services: &Services,
    token: &str,
    inbound: &mut mpsc::Receiver<String>,
    outbound: &mpsc::Sender<String>,
) -> Option<(String, String)> {
    while let Some(raw) = inbound.recv().await {
        let step = match Command::parse(&raw) {
            Ok((Command::CreateUser(cmd), _)) => auth::create_user(services, token, cmd).await,
            Ok((Command::ValidateUser(cmd), _)) => auth::validate_user(services, token, cmd).await,
            Ok((Command::GetPasswordResetUser(cmd), value)) => auth::password_reset_questions(services, cmd, &value)
                .await
                .map(|reply| AuthStep::Continue(Some(reply))),
            Ok((Command::ResetUserPassword(cmd), _)) => auth::reset_password(services, cmd)
                .await
                .map(|reply| AuthStep::Continue(Some(reply))),
            Ok((other, _)) => {
                tracing::debug!(cmd = other.name(), "ignored before login");
                continue;
            }
            Err(ParseError::Unknown(name)) => {
                tracing::debug!(cmd = %name, "ignored before login");
                continue;
            }
            Err(e) => {
                tracing::warn!("malformed payload before login: {:?}", e);
                continue;
            }
        };

        match step {
            Ok(AuthStep::Continue(reply)) => {
                if let Some(reply) = reply {
                    if outbound.send(reply).await.is_err() {
                        return None;
                    }
                }
            }
            Ok(AuthStep::LoggedIn { handle, reply }) => return Some((handle, reply)),
            Err(e) => tracing::error!("authentication handler failed: {}", e),
        }
    }
    None
}

async fn dispatch_loop(
    ctx: SessionCtx,
    inbound: Arc<Mutex<mpsc::Receiver<String>>>,
    notes: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    outbound: mpsc::Sender<String>,
) {
    let mut inbound = inbound.lock().await;
    let mut notes = notes.lock().await;

    loop {
        tokio::select! {
            raw = inbound.recv() => {
                let Some(raw) = raw else { break };
                if let Some(reply) = handle_payload(&ctx, &raw).await {
                    if outbound.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            note = notes.recv() => {
                let Some(note) = note else { break };
                if outbound.send(note).await.is_err() {
                    break;
                }
            }
        }
    }
}
