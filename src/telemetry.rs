//! Telemetry facade: builds records from addresses and fans them out to sinks.
//!
//! Recording never fails from the caller's point of view. Sink errors are
//! logged and dropped.

use async_trait::async_trait;
use iris_core::{
    correlation,
    error::IrisError,
    message::{Address, InboundActivity},
    telemetry::{
        Scenario, TelemetryEvent, BOT_ACTIVITY, SCENARIO, SCENARIO_START, SCENARIO_STOP,
        USER_ACTIVITY,
    },
    traits::TelemetrySink,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct Telemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl Telemetry {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    /// Telemetry that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Inbound activity, before any handler runs.
    pub async fn user_activity(&self, activity: &InboundActivity) {
        let address = activity.address();
        let mut props = json!({
            "type": match activity {
                InboundActivity::Message(_) => "message",
                InboundActivity::Decision(_) | InboundActivity::UnknownInvoke { .. } => "invoke",
                InboundActivity::Ignored { kind, .. } => kind.as_str(),
            },
            "activityId": address.activity_id,
            "bot": address.bot.id,
            "conversation": address.conversation.id,
            "conversationType": address.conversation.conversation_type,
        });
        add_team(&mut props, address);
        match activity {
            InboundActivity::Decision(_) => {
                props["invokeName"] = json!(iris_channels::teams::FILE_CONSENT_INVOKE);
            }
            InboundActivity::UnknownInvoke { name, .. } => props["invokeName"] = json!(name),
            _ => {}
        }
        self.emit(USER_ACTIVITY, address, props).await;
    }

    /// Outbound message, after the platform accepted it.
    pub async fn bot_activity(&self, address: &Address, activity_id: Option<&str>) {
        let mut props = json!({
            "type": "message",
            "activityId": activity_id,
            "bot": address.bot.id,
            "conversation": address.conversation.id,
            "isGroup": !address.is_personal(),
        });
        add_team(&mut props, address);
        self.emit(BOT_ACTIVITY, address, props).await;
    }

    pub async fn scenario_start(&self, address: &Address, scenario: Scenario, props: Value) {
        self.emit(SCENARIO_START, address, with_scenario(scenario, props))
            .await;
    }

    pub async fn scenario_stop(&self, address: &Address, scenario: Scenario, props: Value) {
        self.emit(SCENARIO_STOP, address, with_scenario(scenario, props))
            .await;
    }

    /// A one-shot scenario with no start/stop pair.
    pub async fn scenario(&self, address: &Address, scenario: Scenario, props: Value) {
        self.emit(SCENARIO, address, with_scenario(scenario, props))
            .await;
    }

    async fn emit(&self, name: &str, address: &Address, props: Value) {
        if self.sinks.is_empty() {
            return;
        }

        let mut event = TelemetryEvent::new(name);
        event.correlation_id = correlation::get(address)
            .map(|c| c.to_string())
            .unwrap_or_default();
        event.user_id = Some(address.user.id.clone());
        event.tenant_id = address.conversation.tenant_id.clone();
        if let Value::Object(map) = props {
            event.properties = map;
        }

        for sink in &self.sinks {
            if let Err(e) = sink.record(event.clone()).await {
                warn!("telemetry sink failed for {name}: {e}");
            }
        }
    }
}

fn with_scenario(scenario: Scenario, mut props: Value) -> Value {
    if !props.is_object() {
        props = json!({});
    }
    props["scenario"] = json!(scenario.as_str());
    props
}

fn add_team(props: &mut Value, address: &Address) {
    if let Some(team) = &address.team_id {
        props["team"] = json!(team);
        props["channel"] = json!(address.team_channel_id);
    }
}

/// Sink writing each record as a structured `tracing` event on the
/// `telemetry` target.
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn record(&self, event: TelemetryEvent) -> Result<(), IrisError> {
        let properties = Value::Object(event.properties);
        info!(
            target: "telemetry",
            name = %event.name,
            correlation_id = %event.correlation_id,
            user = event.user_id.as_deref().unwrap_or_default(),
            tenant = event.tenant_id.as_deref().unwrap_or_default(),
            properties = %properties,
            "{}",
            event.name
        );
        Ok(())
    }
}
