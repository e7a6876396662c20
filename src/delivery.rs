//! Consent-based file delivery for recognized text.
//!
//! A proposal stages the text and sends a consent card. The user's answer
//! arrives later as a separate decision event and is only honoured if it
//! names the result currently staged for that conversation.
//!
//! ```text
//! Idle ──> Proposed ──> Accepted ──> Uploading ──> Delivered
//!   │          │                          └──────> UploadFailed
//!   │          ├──> Declined
//!   └──────────┴──> Expired
//! ```

use crate::{i18n, outbox::Outbox};
use iris_core::{
    correlation::{self, CorrelationId},
    error::IrisError,
    message::{
        Address, Card, ConsentAction, ConsentContext, DecisionEvent, OutgoingMessage, UploadInfo,
    },
    telemetry::Scenario,
    traits::Uploader,
};
use iris_memory::{ResultStager, StagedResult};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a staged result stands in the consent protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Proposed,
    Accepted,
    Uploading,
    Delivered,
    UploadFailed,
    Declined,
    Expired,
}

impl DeliveryState {
    pub fn can_transition(self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        matches!(
            (self, next),
            (Idle, Proposed)
                | (Idle, Expired)
                | (Proposed, Accepted)
                | (Proposed, Declined)
                | (Proposed, Expired)
                | (Accepted, Uploading)
                | (Uploading, Delivered)
                | (Uploading, UploadFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::UploadFailed | Self::Declined | Self::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: DeliveryState,
    pub to: DeliveryState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal delivery transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks one decision through the state graph, rejecting illegal moves.
#[derive(Debug)]
pub struct DeliveryMachine {
    state: DeliveryState,
}

impl DeliveryMachine {
    pub fn new(state: DeliveryState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn advance(&mut self, next: DeliveryState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("delivery {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Terminal result of a decision. Reported, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Declined,
    Expired,
    UploadFailed(String),
    Delivered,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declined => "declined",
            Self::Expired => "expired",
            Self::UploadFailed(_) => "upload_failed",
            Self::Delivered => "delivered",
        }
    }

    pub fn state(&self) -> DeliveryState {
        match self {
            Self::Declined => DeliveryState::Declined,
            Self::Expired => DeliveryState::Expired,
            Self::UploadFailed(_) => DeliveryState::UploadFailed,
            Self::Delivered => DeliveryState::Delivered,
        }
    }
}

/// Restore the correlation id echoed in a decision's consent context.
pub fn restore_correlation(decision: &mut DecisionEvent) {
    if decision.context.correlation_id.is_empty() {
        correlation::ensure(&mut decision.address);
    } else {
        correlation::set(
            &mut decision.address,
            CorrelationId::from(decision.context.correlation_id.as_str()),
        );
    }
}

/// Drives proposals and decisions for one bot.
#[derive(Clone)]
pub struct Delivery {
    stager: ResultStager,
    uploader: Arc<dyn Uploader>,
    outbox: Outbox,
}

impl Delivery {
    pub fn new(stager: ResultStager, uploader: Arc<dyn Uploader>, outbox: Outbox) -> Self {
        Self {
            stager,
            uploader,
            outbox,
        }
    }

    /// Stage `text` and send a consent card for it. Returns the new result id.
    ///
    /// Any result already staged for the conversation is superseded.
    pub async fn propose(
        &self,
        address: &mut Address,
        text: &str,
        file_name: &str,
    ) -> Result<String, IrisError> {
        let correlation_id = correlation::ensure(address);
        let result_id = self
            .stager
            .stage(&address.conversation_key(), text)
            .await?;

        let card = Card::FileConsent {
            name: file_name.to_string(),
            description: i18n::t("ocr_file_description").to_string(),
            size_in_bytes: text.len(),
            context: ConsentContext {
                result_id: result_id.clone(),
                correlation_id: correlation_id.to_string(),
            },
        };
        self.outbox
            .send(address, OutgoingMessage::card(card))
            .await?;
        info!(
            "proposed {file_name} ({} bytes) as {result_id} [{correlation_id}]",
            text.len()
        );
        Ok(result_id)
    }

    /// Resolve a decision event against the staged result.
    pub async fn decide(&self, mut decision: DecisionEvent) -> DeliveryOutcome {
        restore_correlation(&mut decision);
        let address = decision.address.clone();
        let telemetry = self.outbox.telemetry();
        telemetry
            .scenario_start(
                &address,
                Scenario::OcrSend,
                json!({"action": decision.action.as_str()}),
            )
            .await;

        let outcome = match self.run(&decision).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{e}");
                DeliveryOutcome::Expired
            }
        };

        let mut props = json!({
            "success": matches!(outcome, DeliveryOutcome::Delivered | DeliveryOutcome::Declined),
            "outcome": outcome.as_str(),
        });
        if let DeliveryOutcome::UploadFailed(reason) = &outcome {
            props["error"] = json!(reason);
        }
        telemetry
            .scenario_stop(&address, Scenario::OcrSend, props)
            .await;
        outcome
    }

    async fn run(&self, decision: &DecisionEvent) -> Result<DeliveryOutcome, IllegalTransition> {
        let address = &decision.address;
        let key = address.conversation_key();
        let staged = match self.stager.peek(&key).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!("could not read staged result for {key}: {e}");
                None
            }
        };

        let mut machine = DeliveryMachine::new(if staged.is_some() {
            DeliveryState::Proposed
        } else {
            DeliveryState::Idle
        });

        let Some(staged) = staged.filter(|s| s.matches(&key, &decision.context.result_id))
        else {
            machine.advance(DeliveryState::Expired)?;
            info!(
                "{} for {key} names result '{}', which is not staged",
                decision.action.as_str(),
                decision.context.result_id
            );
            self.outbox
                .say(address, OutgoingMessage::text(i18n::t("ocr_expired")))
                .await;
            return Ok(DeliveryOutcome::Expired);
        };

        match &decision.action {
            ConsentAction::Decline => {
                machine.advance(DeliveryState::Declined)?;
                self.delete_card(decision).await;
                self.outbox
                    .say(address, OutgoingMessage::text(i18n::t("ocr_declined")))
                    .await;
                self.clear(&staged).await;
                Ok(DeliveryOutcome::Declined)
            }
            ConsentAction::Accept(info) => {
                machine.advance(DeliveryState::Accepted)?;
                machine.advance(DeliveryState::Uploading)?;
                self.upload(decision, &staged, info, &mut machine).await
            }
        }
    }

    async fn upload(
        &self,
        decision: &DecisionEvent,
        staged: &StagedResult,
        info: &UploadInfo,
        machine: &mut DeliveryMachine,
    ) -> Result<DeliveryOutcome, IllegalTransition> {
        let address = &decision.address;
        self.outbox.typing(address).await;

        match self
            .uploader
            .upload(&info.upload_url, staged.text.as_bytes())
            .await
        {
            Ok(()) => {
                machine.advance(DeliveryState::Delivered)?;
                self.delete_card(decision).await;
                let card = Card::FileInfo {
                    name: info.name.clone(),
                    content_url: info.content_url.clone(),
                    unique_id: info.unique_id.clone(),
                    file_type: info.file_type.clone(),
                };
                self.outbox.say(address, OutgoingMessage::card(card)).await;
                self.clear(staged).await;
                info!("delivered {} ({} bytes)", info.name, staged.text.len());
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                machine.advance(DeliveryState::UploadFailed)?;
                warn!("upload of {} failed: {e}", info.name);
                let reason = e.to_string();
                self.outbox
                    .say(address, OutgoingMessage::text(i18n::ocr_upload_error(&reason)))
                    .await;
                Ok(DeliveryOutcome::UploadFailed(reason))
            }
        }
    }

    async fn delete_card(&self, decision: &DecisionEvent) {
        if let Some(card_id) = &decision.reply_to_id {
            self.outbox.delete(&decision.address, card_id).await;
        }
    }

    /// Clear the decided result, leaving any result staged since in place.
    async fn clear(&self, staged: &StagedResult) {
        if let Err(e) = self.stager.clear_if(staged).await {
            warn!(
                "failed to clear staged result for {}: {e}",
                staged.conversation_key
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Telemetry;
    use crate::testing::{address, Call, FakeChannel, FakeUploader, RecordingSink};
    use iris_core::telemetry::SCENARIO_STOP;
    use iris_memory::MemoryStore;

    struct Harness {
        delivery: Delivery,
        stager: ResultStager,
        channel: Arc<FakeChannel>,
        uploader: Arc<FakeUploader>,
        sink: Arc<RecordingSink>,
    }

    fn harness(uploader: FakeUploader) -> Harness {
        let channel = Arc::new(FakeChannel::default());
        let uploader = Arc::new(uploader);
        let sink = Arc::new(RecordingSink::default());
        let stager = ResultStager::new(Arc::new(MemoryStore::new()));
        let outbox = Outbox::new(channel.clone(), Telemetry::new(vec![sink.clone()]));
        Harness {
            delivery: Delivery::new(stager.clone(), uploader.clone(), outbox),
            stager,
            channel,
            uploader,
            sink,
        }
    }

    fn upload_info() -> UploadInfo {
        UploadInfo {
            name: "scan.png.txt".into(),
            upload_url: "https://upload.example/session-1".into(),
            content_url: "https://files.example/scan.png.txt".into(),
            unique_id: "u-2".into(),
            file_type: "txt".into(),
        }
    }

    fn decision(result_id: &str, action: ConsentAction) -> DecisionEvent {
        DecisionEvent {
            address: address("a:1"),
            reply_to_id: Some("card-1".into()),
            action,
            context: ConsentContext {
                result_id: result_id.into(),
                correlation_id: "C-1".into(),
            },
        }
    }

    #[test]
    fn test_legal_transitions() {
        use DeliveryState::*;
        let mut m = DeliveryMachine::new(Idle);
        m.advance(Proposed).unwrap();
        m.advance(Accepted).unwrap();
        m.advance(Uploading).unwrap();
        m.advance(Delivered).unwrap();
        assert!(m.state().is_terminal());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        use DeliveryState::*;
        let mut m = DeliveryMachine::new(Idle);
        assert_eq!(
            m.advance(Uploading),
            Err(IllegalTransition {
                from: Idle,
                to: Uploading
            })
        );
        assert_eq!(m.state(), Idle);

        assert!(!Proposed.can_transition(Delivered));
        assert!(!Declined.can_transition(Accepted));
        assert!(!Delivered.can_transition(Uploading));
        assert!(!Idle.can_transition(Declined));
    }

    #[tokio::test]
    async fn test_propose_stages_and_sends_card() {
        let h = harness(FakeUploader::ok());
        let mut addr = address("a:1");
        let result_id = h
            .delivery
            .propose(&mut addr, "Hello there", "scan.png.txt")
            .await
            .unwrap();

        let staged = h.stager.peek(&addr.conversation_key()).await.unwrap().unwrap();
        assert_eq!(staged.result_id, result_id);
        assert_eq!(staged.text, "Hello there");

        let correlation_id = correlation::get(&addr).unwrap();
        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0].cards[0] {
            Card::FileConsent {
                name,
                size_in_bytes,
                context,
                ..
            } => {
                assert_eq!(name, "scan.png.txt");
                assert_eq!(*size_in_bytes, 11);
                assert_eq!(context.result_id, result_id);
                assert_eq!(context.correlation_id, correlation_id.as_str());
            }
            other => panic!("unexpected card {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_accept_delivers() {
        let h = harness(FakeUploader::ok());
        let mut addr = address("a:1");
        let id = h.delivery.propose(&mut addr, "Hello there", "scan.png.txt").await.unwrap();

        let outcome = h
            .delivery
            .decide(decision(&id, ConsentAction::Accept(upload_info())))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        let uploads = h.uploader.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "https://upload.example/session-1");
        assert_eq!(uploads[0].1, b"Hello there");

        assert_eq!(h.channel.deleted(), vec!["card-1".to_string()]);
        let last = h.channel.sent().pop().unwrap();
        assert_eq!(
            last.cards,
            vec![Card::FileInfo {
                name: "scan.png.txt".into(),
                content_url: "https://files.example/scan.png.txt".into(),
                unique_id: "u-2".into(),
                file_type: "txt".into(),
            }]
        );
        assert!(h.stager.peek(&addr.conversation_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typing_precedes_upload_after_match() {
        let h = harness(FakeUploader::ok());
        let mut addr = address("a:1");
        let id = h.delivery.propose(&mut addr, "x", "f.txt").await.unwrap();
        h.delivery
            .decide(decision(&id, ConsentAction::Accept(upload_info())))
            .await;

        let calls = h.channel.calls();
        let typing = calls.iter().position(|c| *c == Call::Typing).unwrap();
        let delete = calls
            .iter()
            .position(|c| matches!(c, Call::Delete(_)))
            .unwrap();
        assert!(typing < delete);
    }

    #[tokio::test]
    async fn test_superseded_result_expires_without_upload() {
        let h = harness(FakeUploader::ok());
        let mut addr = address("a:1");
        let r1 = h.delivery.propose(&mut addr, "first", "f.txt").await.unwrap();
        let r2 = h.delivery.propose(&mut addr, "second", "f.txt").await.unwrap();

        let outcome = h
            .delivery
            .decide(decision(&r1, ConsentAction::Accept(upload_info())))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Expired);
        assert!(h.uploader.uploads().is_empty());
        assert!(h.channel.deleted().is_empty());
        assert_eq!(h.channel.texts().last().unwrap(), i18n::t("ocr_expired"));

        // The newer result is untouched.
        let staged = h.stager.peek(&addr.conversation_key()).await.unwrap().unwrap();
        assert_eq!(staged.result_id, r2);
    }

    #[tokio::test]
    async fn test_nothing_staged_expires() {
        let h = harness(FakeUploader::ok());
        let outcome = h
            .delivery
            .decide(decision("R-unknown", ConsentAction::Accept(upload_info())))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Expired);
        assert!(h.uploader.uploads().is_empty());

        let outcome = h.delivery.decide(decision("", ConsentAction::Decline)).await;
        assert_eq!(outcome, DeliveryOutcome::Expired);
    }

    #[tokio::test]
    async fn test_decline_clears_and_deletes_card() {
        let h = harness(FakeUploader::ok());
        let mut addr = address("a:1");
        let id = h.delivery.propose(&mut addr, "text", "f.txt").await.unwrap();

        let outcome = h.delivery.decide(decision(&id, ConsentAction::Decline)).await;
        assert_eq!(outcome, DeliveryOutcome::Declined);
        assert_eq!(h.channel.deleted(), vec!["card-1".to_string()]);
        assert_eq!(h.channel.texts().last().unwrap(), i18n::t("ocr_declined"));
        assert!(h.stager.peek(&addr.conversation_key()).await.unwrap().is_none());
        assert!(h.uploader.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_prompt_and_result() {
        let h = harness(FakeUploader::failing(503, "Service Unavailable"));
        let mut addr = address("a:1");
        let id = h.delivery.propose(&mut addr, "text", "f.txt").await.unwrap();

        let outcome = h
            .delivery
            .decide(decision(&id, ConsentAction::Accept(upload_info())))
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::UploadFailed("Service Unavailable".into())
        );
        assert!(h.channel.deleted().is_empty());
        assert!(h
            .channel
            .texts()
            .last()
            .unwrap()
            .contains("Service Unavailable"));

        // The user can answer the same card again.
        let staged = h.stager.peek(&addr.conversation_key()).await.unwrap().unwrap();
        assert_eq!(staged.result_id, id);
    }

    #[tokio::test]
    async fn test_decision_from_other_conversation_expires() {
        let h = harness(FakeUploader::ok());
        let mut addr = address("a:1");
        let id = h.delivery.propose(&mut addr, "secret", "f.txt").await.unwrap();

        let mut forged = decision(&id, ConsentAction::Accept(upload_info()));
        forged.address = address("a:2");
        assert_eq!(h.delivery.decide(forged).await, DeliveryOutcome::Expired);
        assert!(h.uploader.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_decision_restores_correlation_id() {
        let h = harness(FakeUploader::ok());
        let mut addr = address("a:1");
        let id = h.delivery.propose(&mut addr, "text", "f.txt").await.unwrap();
        let proposal_id = correlation::get(&addr).unwrap();

        let mut d = decision(&id, ConsentAction::Decline);
        d.context.correlation_id = proposal_id.to_string();
        h.delivery.decide(d).await;

        let stops = h.sink.named(SCENARIO_STOP);
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].correlation_id, proposal_id.as_str());
        assert_eq!(stops[0].property("outcome"), Some(&json!("declined")));
        assert_eq!(stops[0].property("success"), Some(&json!(true)));
    }

    #[test]
    fn test_restore_correlation_mints_when_absent() {
        let mut d = decision("R1", ConsentAction::Decline);
        d.context.correlation_id.clear();
        restore_correlation(&mut d);
        assert!(correlation::get(&d.address).is_some());
    }

    /// Stages a newer result for the conversation while the PUT is in flight.
    struct RestagingUploader {
        stager: ResultStager,
        newer: std::sync::Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl Uploader for RestagingUploader {
        async fn upload(
            &self,
            _upload_url: &str,
            _content: &[u8],
        ) -> Result<(), iris_core::error::UploadError> {
            let id = self.stager.stage("28:bot:a:1", "newer text").await.unwrap();
            *self.newer.lock().unwrap() = Some(id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delivery_keeps_result_staged_during_upload() {
        let channel = Arc::new(FakeChannel::default());
        let stager = ResultStager::new(Arc::new(MemoryStore::new()));
        let uploader = Arc::new(RestagingUploader {
            stager: stager.clone(),
            newer: std::sync::Mutex::new(None),
        });
        let outbox = Outbox::new(channel, Telemetry::disabled());
        let delivery = Delivery::new(stager.clone(), uploader.clone(), outbox);

        let mut addr = address("a:1");
        let first = delivery.propose(&mut addr, "old text", "a.txt").await.unwrap();
        let outcome = delivery
            .decide(decision(&first, ConsentAction::Accept(upload_info())))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        let newer = uploader.newer.lock().unwrap().clone().unwrap();
        let staged = stager.peek("28:bot:a:1").await.unwrap().unwrap();
        assert_eq!(staged.result_id, newer);
        assert_eq!(staged.text, "newer text");
    }
}
