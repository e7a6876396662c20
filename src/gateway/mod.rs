//! Gateway: HTTP endpoints connecting the chat platform to the bots.
//!
//! Messages are acknowledged immediately and handled on a spawned task,
//! serialized per conversation. Consent decisions arrive as invokes and are
//! answered inline so the platform learns whether they were handled.

mod locks;


pub use locks::ConversationLocks;

use crate::{bots::Bot, delivery::restore_correlation, telemetry::Telemetry};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use iris_channels::teams::{parse_activity, Activity};
use iris_core::{config::ServerConfig, correlation, message::InboundActivity};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state for the endpoint handlers.
#[derive(Clone)]
pub struct AppState {
    pub caption: Option<Arc<dyn Bot>>,
    pub ocr: Option<Arc<dyn Bot>>,
    pub telemetry: Telemetry,
    pub locks: ConversationLocks,
}

impl AppState {
    pub fn new(
        caption: Option<Arc<dyn Bot>>,
        ocr: Option<Arc<dyn Bot>>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            caption,
            ocr,
            telemetry,
            locks: ConversationLocks::default(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/caption/messages", post(caption_messages))
        .route("/ocr/messages", post(ocr_messages))
        .route("/ping", get(ping))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?;

    info!(
        "Iris listening on {addr} | caption: {} | ocr: {}",
        if state.caption.is_some() { "on" } else { "off" },
        if state.ocr.is_some() { "on" } else { "off" },
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

/// `GET /ping`: liveness probe.
async fn ping() -> &'static str {
    "OK"
}

/// `POST /caption/messages`
async fn caption_messages(
    State(state): State<AppState>,
    Json(activity): Json<Activity>,
) -> StatusCode {
    let bot = state.caption.clone();
    dispatch(&state, bot, activity).await
}

/// `POST /ocr/messages`
async fn ocr_messages(State(state): State<AppState>, Json(activity): Json<Activity>) -> StatusCode {
    let bot = state.ocr.clone();
    dispatch(&state, bot, activity).await
}

async fn dispatch(state: &AppState, bot: Option<Arc<dyn Bot>>, activity: Activity) -> StatusCode {
    let Some(bot) = bot else {
        return StatusCode::NOT_FOUND;
    };

    let mut inbound = match parse_activity(activity) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("{}: rejected activity: {e}", bot.name());
            return StatusCode::BAD_REQUEST;
        }
    };

    if let InboundActivity::Decision(decision) = &mut inbound {
        restore_correlation(decision);
    }
    correlation::ensure(inbound.address_mut());
    state.telemetry.user_activity(&inbound).await;

    match inbound {
        InboundActivity::Message(message) => {
            let key = message.address.conversation_key();
            let locks = state.locks.clone();
            tokio::spawn(async move {
                locks.run(&key, bot.on_message(message)).await;
            });
            StatusCode::ACCEPTED
        }
        InboundActivity::Decision(decision) => {
            let conversation = decision.address.conversation.id.clone();
            match bot.on_decision(decision).await {
                Some(outcome) => {
                    info!(
                        "{}: decision in {conversation} resolved as {}",
                        bot.name(),
                        outcome.as_str()
                    );
                    StatusCode::OK
                }
                None => {
                    warn!("{}: consent decisions are not handled here", bot.name());
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        }
        InboundActivity::UnknownInvoke { name, .. } => {
            warn!("{}: unknown invoke '{name}'", bot.name());
            StatusCode::INTERNAL_SERVER_ERROR
        }
        InboundActivity::Ignored { kind, .. } => {
            debug!("{}: ignoring {kind} activity", bot.name());
            StatusCode::ACCEPTED
        }
    }
}
