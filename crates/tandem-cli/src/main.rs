//! # tandem
//!
//! Headless client for the Tandem messaging service.
//!
//! Opens a single conversation (by key or deep link), optionally sends one
//! message with attachments, then follows the conversation and logs every
//! change of the reactive views until Ctrl+C:
//! - the aggregated conversation list
//! - the message timeline of the open conversation
//! - its match gating verdict
//! - push health and poll errors

mod args;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tandem_client::{
    spawn_engine, ComposeSession, EngineHandle, EngineServices, LocalFile, NoopPreviews,
    SyncConfig,
};
use tandem_net::{RestClient, StaticSession, WsPushChannel};
use tandem_shared::{ConversationKey, UserId};
use tandem_store::Delivery;

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tandem_client=debug,tandem_net=debug")),
        )
        .init();

    info!("Starting tandem v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration (environment, then command line)
    // -----------------------------------------------------------------------
    let args = Args::parse();
    let mut config = SyncConfig::from_env();
    args.apply(&mut config);
    info!(
        api = %config.api_url,
        push = %config.push_url,
        authenticated = config.token.is_some(),
        "Loaded configuration"
    );

    let user = config
        .user_id
        .clone()
        .context("no signed-in user: set TANDEM_USER_ID or pass --user")?;

    // -----------------------------------------------------------------------
    // 3. Wire the engine to the live services
    // -----------------------------------------------------------------------
    let me = UserId::new(user);
    let session = Arc::new(StaticSession::new(me.clone(), config.token.clone()));
    let rest = Arc::new(
        RestClient::new(&config.api_url, session.clone(), config.request_timeout)
            .context("invalid REST base URL")?,
    );
    let (push, push_events) = WsPushChannel::new(config.push_url.clone(), session.clone());

    let engine = spawn_engine(
        config,
        EngineServices {
            api: rest.clone(),
            directory: rest,
            push: Arc::new(push),
            push_events,
            session,
        },
    );

    // -----------------------------------------------------------------------
    // 4. Open the conversation and send, if asked to
    // -----------------------------------------------------------------------
    let route = engine
        .select_conversation(&args.route)
        .await
        .with_context(|| format!("cannot open {:?}", args.route))?;
    info!(key = %route.key, room = %route.room_key(&me), "Conversation open");

    if let Some(body) = &args.send {
        send_once(&engine, &route.key, body, &args).await?;
        if args.once {
            engine.shutdown().await;
            return Ok(());
        }
    }

    // -----------------------------------------------------------------------
    // 5. Follow the views until Ctrl+C
    // -----------------------------------------------------------------------
    follow(&engine, &route.key).await?;
    engine.shutdown().await;

    Ok(())
}

async fn send_once(
    engine: &EngineHandle,
    key: &ConversationKey,
    body: &str,
    args: &Args,
) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(args.attachments.len());
    for path in &args.attachments {
        let file = LocalFile::from_path(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        files.push(file);
    }

    let mut compose = ComposeSession::new(Arc::new(NoopPreviews));
    compose.retarget(key.clone());
    compose.attach(files)?;

    match compose.send(engine, body).await {
        Ok(message) => info!(id = %message.id, "Message sent"),
        Err(e) => warn!(kind = ?e.kind(), error = %e, "Message not sent"),
    }
    Ok(())
}

async fn follow(engine: &EngineHandle, key: &ConversationKey) -> anyhow::Result<()> {
    let mut list = engine.conversation_list();
    let mut status = engine.sync_status();
    let mut timeline = engine.messages(key).await?;
    let mut gate = engine.match_state(key).await?;
    let mut seen = HashSet::new();

    loop {
        tokio::select! {
            changed = list.changed() => {
                if changed.is_err() {
                    break;
                }
                let entries = list.borrow_and_update();
                let unread: u32 = entries.iter().map(|e| e.unread_count()).sum();
                info!(conversations = entries.len(), unread, "Conversation list updated");
            }
            changed = timeline.changed() => {
                if changed.is_err() {
                    break;
                }
                for stored in timeline.borrow_and_update().iter() {
                    let m = &stored.message;
                    match &stored.delivery {
                        Delivery::Persisted => {
                            if seen.insert(m.id.clone()) {
                                info!(id = %m.id, from = %m.sender_id, at = %m.created_at, "{}", m.body);
                            }
                        }
                        Delivery::Pending { token } => {
                            info!(%token, "Sending: {}", m.body);
                        }
                        Delivery::Failed { token, reason } => {
                            warn!(%token, reason = %reason, "Failed: {}", m.body);
                        }
                    }
                }
            }
            changed = gate.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = gate.borrow_and_update();
                info!(
                    status = ?state.status,
                    can_send = state.can_send,
                    reason = state.reason_message.as_deref().unwrap_or(""),
                    "Match state"
                );
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update();
                info!(push = ?current.push, poll_only = current.is_poll_only(), "Sync status");
                if let Some(failure) = &current.poll_error {
                    warn!(kind = ?failure.kind, "Poll failed: {}", failure.message);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}
