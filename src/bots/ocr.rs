//! OCR bot: reads the text in an image and offers it as a `.txt` file.

use super::{failure_reason, Bot};
use crate::{
    delivery::{Delivery, DeliveryOutcome},
    i18n,
    outbox::Outbox,
    resolver::{self, ImageSource},
};
use async_trait::async_trait;
use iris_core::{
    error::IrisError,
    message::{Address, DecisionEvent, IncomingMessage, OutgoingMessage},
    telemetry::Scenario,
    traits::Analyzer,
    vision::TextResult,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub struct OcrBot {
    outbox: Outbox,
    analyzer: Arc<dyn Analyzer>,
    delivery: Delivery,
    language: String,
}

impl OcrBot {
    pub fn new(
        outbox: Outbox,
        analyzer: Arc<dyn Analyzer>,
        delivery: Delivery,
        language: &str,
    ) -> Self {
        Self {
            outbox,
            analyzer,
            delivery,
            language: language.to_string(),
        }
    }

    async fn recognize(
        &self,
        source: &ImageSource,
        address: &Address,
    ) -> Result<TextResult, IrisError> {
        let request = resolver::fetch(source, self.outbox.channel().as_ref(), address).await?;
        Ok(self
            .analyzer
            .recognize_text(&request, Some(self.language.as_str()))
            .await?)
    }

    /// Reply to a finished recognition. Returns whether any text was found.
    async fn respond(
        &self,
        address: &mut Address,
        result: &TextResult,
        file_name: &str,
    ) -> Result<bool, IrisError> {
        let text = result.recognized_text();
        if text.is_empty() {
            self.outbox
                .say(address, OutgoingMessage::text(i18n::t("ocr_no_text")))
                .await;
            return Ok(false);
        }

        let language = i18n::language_name(&result.language);
        self.outbox
            .say(address, OutgoingMessage::text(i18n::ocr_text_found(&language)))
            .await;
        self.delivery.propose(address, &text, file_name).await?;
        Ok(true)
    }
}

#[async_trait]
impl Bot for OcrBot {
    fn name(&self) -> &str {
        "ocr"
    }

    async fn on_message(&self, mut message: IncomingMessage) {
        let telemetry = self.outbox.telemetry();
        self.outbox.typing(&message.address).await;

        let Some(source) = resolver::resolve(&message) else {
            let address = &message.address;
            telemetry
                .scenario(address, Scenario::UnrecognizedInput, json!({}))
                .await;
            let help = if address.is_personal() {
                "ocr_help"
            } else {
                "ocr_help_paste"
            };
            self.outbox
                .say(address, OutgoingMessage::text(i18n::t(help)))
                .await;
            return;
        };

        let file_name = source
            .file_name()
            .map(|name| format!("{name}.txt"))
            .unwrap_or_else(|| i18n::t("ocr_file_name").to_string());
        let address = &mut message.address;

        telemetry
            .scenario_start(address, Scenario::Ocr, json!({"imageSource": source.kind()}))
            .await;

        let outcome = match self.recognize(&source, address).await {
            Ok(result) => self.respond(address, &result, &file_name).await,
            Err(e) => {
                let reason = failure_reason(&e);
                warn!("failed to analyze image: {e}");
                self.outbox
                    .say(address, OutgoingMessage::text(i18n::analysis_error(&reason)))
                    .await;
                Err(e)
            }
        };

        let props = match outcome {
            Ok(found) => {
                info!(
                    "recognized {} image for {} (text: {found})",
                    source.kind(),
                    address.conversation.id
                );
                json!({"success": true, "text": found})
            }
            Err(e) => json!({"success": false, "error": failure_reason(&e)}),
        };
        telemetry.scenario_stop(address, Scenario::Ocr, props).await;
    }

    async fn on_decision(&self, decision: DecisionEvent) -> Option<DeliveryOutcome> {
        Some(self.delivery.decide(decision).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Telemetry;
    use crate::testing::{address, FakeAnalyzer, FakeChannel, FakeUploader, RecordingSink};
    use chrono::Utc;
    use iris_core::correlation;
    use iris_core::message::{Attachment, Card, ConsentAction, ConsentContext, UploadInfo};
    use iris_core::telemetry::SCENARIO_STOP;
    use iris_core::vision::AnalysisRequest;
    use iris_memory::{MemoryStore, ResultStager};
    use uuid::Uuid;

    const TEXT: &str = r#"{"language":"en","orientation":"Up","regions":[
        {"boundingBox":"0,0,9,9","lines":[
            {"boundingBox":"0,0,9,4","words":[
                {"boundingBox":"0,0,4,4","text":"Hello"},
                {"boundingBox":"5,0,4,4","text":"there"}]},
            {"boundingBox":"0,5,9,4","words":[{"boundingBox":"0,5,4,4","text":"friend"}]}]}]}"#;
    const NO_TEXT: &str = r#"{"language":"unk","regions":[]}"#;

    struct Harness {
        bot: OcrBot,
        channel: Arc<FakeChannel>,
        analyzer: Arc<FakeAnalyzer>,
        uploader: Arc<FakeUploader>,
        stager: ResultStager,
        sink: Arc<RecordingSink>,
    }

    fn harness(analyzer: FakeAnalyzer, uploader: FakeUploader) -> Harness {
        let channel = Arc::new(FakeChannel::default());
        let analyzer = Arc::new(analyzer);
        let uploader = Arc::new(uploader);
        let sink = Arc::new(RecordingSink::default());
        let stager = ResultStager::new(Arc::new(MemoryStore::new()));
        let outbox = Outbox::new(channel.clone(), Telemetry::new(vec![sink.clone()]));
        let delivery = Delivery::new(stager.clone(), uploader.clone(), outbox.clone());
        Harness {
            bot: OcrBot::new(outbox, analyzer.clone(), delivery, "en"),
            channel,
            analyzer,
            uploader,
            stager,
            sink,
        }
    }

    fn message(text: &str, attachments: Vec<Attachment>) -> IncomingMessage {
        let mut address = address("a:1");
        correlation::ensure(&mut address);
        IncomingMessage {
            id: Uuid::new_v4(),
            address,
            text: text.into(),
            attachments,
            timestamp: Utc::now(),
        }
    }

    fn shared_file() -> Attachment {
        Attachment::FileDownload {
            name: "scan.png".into(),
            download_url: "https://files.example/scan.png?token=abc".into(),
            unique_id: None,
            file_type: Some("png".into()),
        }
    }

    /// The consent context of the last card sent.
    fn last_consent(channel: &FakeChannel) -> (String, ConsentContext, usize) {
        channel
            .sent()
            .into_iter()
            .rev()
            .find_map(|m| match m.cards.first() {
                Some(Card::FileConsent {
                    name,
                    context,
                    size_in_bytes,
                    ..
                }) => Some((name.clone(), context.clone(), *size_in_bytes)),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_shared_file_proposes_named_txt() {
        let h = harness(FakeAnalyzer::with_text(TEXT), FakeUploader::ok());
        let msg = message("", vec![shared_file()]);
        let correlation_id = correlation::get(&msg.address).unwrap();
        h.bot.on_message(msg).await;

        assert_eq!(
            h.analyzer.requests(),
            vec![AnalysisRequest::Url(
                "https://files.example/scan.png?token=abc".into()
            )]
        );
        assert_eq!(h.channel.texts(), vec![i18n::ocr_text_found("English")]);

        let (name, context, size) = last_consent(&h.channel);
        let expected = "Hello there\r\nfriend";
        assert_eq!(name, "scan.png.txt");
        assert_eq!(size, expected.len());
        assert_eq!(context.correlation_id, correlation_id.as_str());

        let staged = h.stager.peek("28:bot:a:1").await.unwrap().unwrap();
        assert_eq!(staged.result_id, context.result_id);
        assert_eq!(staged.text, expected);

        let stop = h.sink.named(SCENARIO_STOP);
        assert_eq!(stop[0].property("text"), Some(&json!(true)));
        assert_eq!(stop[0].correlation_id, correlation_id.as_str());
    }

    #[tokio::test]
    async fn test_url_source_uses_default_file_name() {
        let h = harness(FakeAnalyzer::with_text(TEXT), FakeUploader::ok());
        h.bot
            .on_message(message("https://img.example/sign.jpg", vec![]))
            .await;
        let (name, _, _) = last_consent(&h.channel);
        assert_eq!(name, i18n::t("ocr_file_name"));
    }

    #[tokio::test]
    async fn test_empty_text_stages_nothing() {
        let h = harness(FakeAnalyzer::with_text(NO_TEXT), FakeUploader::ok());
        h.bot
            .on_message(message("https://img.example/sky.png", vec![]))
            .await;

        assert_eq!(h.channel.texts(), vec![i18n::t("ocr_no_text").to_string()]);
        assert!(h.channel.sent().iter().all(|m| m.cards.is_empty()));
        assert!(h.stager.peek("28:bot:a:1").await.unwrap().is_none());
        let stop = h.sink.named(SCENARIO_STOP);
        assert_eq!(stop[0].property("success"), Some(&json!(true)));
        assert_eq!(stop[0].property("text"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_analysis_error_is_reported() {
        let h = harness(FakeAnalyzer::failing("Invalid image."), FakeUploader::ok());
        h.bot
            .on_message(message("https://img.example/x.png", vec![]))
            .await;
        assert_eq!(h.channel.texts(), vec![i18n::analysis_error("Invalid image.")]);
        assert!(h.stager.peek("28:bot:a:1").await.unwrap().is_none());
        let stop = h.sink.named(SCENARIO_STOP);
        assert_eq!(stop[0].property("error"), Some(&json!("Invalid image.")));
    }

    #[tokio::test]
    async fn test_help_when_no_image() {
        let h = harness(FakeAnalyzer::with_text(TEXT), FakeUploader::ok());
        h.bot.on_message(message("what can you do?", vec![])).await;
        assert_eq!(h.channel.texts(), vec![i18n::t("ocr_help").to_string()]);
    }

    #[tokio::test]
    async fn test_propose_then_accept_round_trip() {
        let h = harness(FakeAnalyzer::with_text(TEXT), FakeUploader::ok());
        h.bot.on_message(message("", vec![shared_file()])).await;
        let (_, context, _) = last_consent(&h.channel);

        let decision = DecisionEvent {
            address: address("a:1"),
            reply_to_id: Some("out-2".into()),
            action: ConsentAction::Accept(UploadInfo {
                name: "scan.png.txt".into(),
                upload_url: "https://upload.example/s".into(),
                content_url: "https://files.example/scan.png.txt".into(),
                unique_id: "u-9".into(),
                file_type: "txt".into(),
            }),
            context,
        };
        let outcome = h.bot.on_decision(decision).await;
        assert_eq!(outcome, Some(DeliveryOutcome::Delivered));
        assert_eq!(h.uploader.uploads()[0].1, b"Hello there\r\nfriend");
        assert_eq!(h.channel.deleted(), vec!["out-2".to_string()]);
    }

    #[tokio::test]
    async fn test_second_image_supersedes_first_proposal() {
        let h = harness(FakeAnalyzer::with_text(TEXT), FakeUploader::ok());
        h.bot.on_message(message("", vec![shared_file()])).await;
        let (_, first, _) = last_consent(&h.channel);
        h.bot.on_message(message("", vec![shared_file()])).await;
        let (_, second, _) = last_consent(&h.channel);
        assert_ne!(first.result_id, second.result_id);

        let decision = DecisionEvent {
            address: address("a:1"),
            reply_to_id: None,
            action: ConsentAction::Accept(UploadInfo {
                upload_url: "https://upload.example/s".into(),
                ..Default::default()
            }),
            context: first,
        };
        assert_eq!(
            h.bot.on_decision(decision).await,
            Some(DeliveryOutcome::Expired)
        );
        assert!(h.uploader.uploads().is_empty());
    }
}
