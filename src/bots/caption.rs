//! Caption bot: describes the image it is sent.

use super::{failure_reason, Bot};
use crate::{i18n, outbox::Outbox, resolver};
use async_trait::async_trait;
use iris_core::{
    error::IrisError,
    message::{Address, IncomingMessage, OutgoingMessage, TextFormat},
    telemetry::Scenario,
    traits::Analyzer,
    vision::DescribeResult,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub struct CaptionBot {
    outbox: Outbox,
    analyzer: Arc<dyn Analyzer>,
    language: String,
}

impl CaptionBot {
    pub fn new(outbox: Outbox, analyzer: Arc<dyn Analyzer>, language: &str) -> Self {
        Self {
            outbox,
            analyzer,
            language: language.to_string(),
        }
    }

    async fn describe(
        &self,
        source: &resolver::ImageSource,
        address: &Address,
    ) -> Result<DescribeResult, IrisError> {
        let request = resolver::fetch(source, self.outbox.channel().as_ref(), address).await?;
        Ok(self
            .analyzer
            .describe(&request, Some(self.language.as_str()), Some(1))
            .await?)
    }
}

#[async_trait]
impl Bot for CaptionBot {
    fn name(&self) -> &str {
        "caption"
    }

    async fn on_message(&self, message: IncomingMessage) {
        let address = &message.address;
        let telemetry = self.outbox.telemetry();
        self.outbox.typing(address).await;

        let Some(source) = resolver::resolve(&message) else {
            telemetry
                .scenario(address, Scenario::UnrecognizedInput, json!({}))
                .await;
            let help = if address.is_personal() {
                "caption_help"
            } else {
                "caption_help_paste"
            };
            self.outbox
                .say(address, OutgoingMessage::text(i18n::t(help)))
                .await;
            return;
        };

        telemetry
            .scenario_start(
                address,
                Scenario::Caption,
                json!({"imageSource": source.kind()}),
            )
            .await;

        match self.describe(&source, address).await {
            Ok(result) => {
                let caption = result.best_caption().map(|c| c.text.clone());
                let reply = match &caption {
                    Some(text) => OutgoingMessage::text(i18n::caption_response(text)),
                    None => OutgoingMessage::text(i18n::t("no_caption"))
                        .with_format(TextFormat::Xml),
                };
                self.outbox.say(address, reply).await;
                info!(
                    "captioned {} image for {}",
                    source.kind(),
                    address.conversation.id
                );
                telemetry
                    .scenario_stop(
                        address,
                        Scenario::Caption,
                        json!({"success": true, "caption": caption.is_some()}),
                    )
                    .await;
            }
            Err(e) => {
                let reason = failure_reason(&e);
                warn!("failed to analyze image: {e}");
                self.outbox
                    .say(address, OutgoingMessage::text(i18n::analysis_error(&reason)))
                    .await;
                telemetry
                    .scenario_stop(
                        address,
                        Scenario::Caption,
                        json!({"success": false, "error": reason}),
                    )
                    .await;
            }
        }
    }
}
