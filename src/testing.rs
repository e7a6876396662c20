//! Recording fakes for the trait seams, shared by the unit tests.

use async_trait::async_trait;
use iris_core::{
    error::{IrisError, UploadError},
    message::{Account, Address, ConversationRef, ConversationType, OutgoingMessage},
    telemetry::TelemetryEvent,
    traits::{Analyzer, Channel, TelemetrySink, Uploader},
    vision::{AnalysisError, AnalysisRequest, DescribeResult, TextResult},
};
use std::sync::Mutex;

pub fn address(conversation_id: &str) -> Address {
    Address {
        channel_id: "msteams".into(),
        service_url: "https://smba.example/".into(),
        bot: Account {
            id: "28:bot".into(),
            name: Some("Iris".into()),
        },
        user: Account {
            id: "29:user".into(),
            name: Some("Ada".into()),
        },
        conversation: ConversationRef {
            id: conversation_id.into(),
            conversation_type: ConversationType::Personal,
            tenant_id: Some("t-1".into()),
        },
        activity_id: Some("act-in".into()),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn record(&self, event: TelemetryEvent) -> Result<(), IrisError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Everything a bot did through the channel, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send(OutgoingMessage),
    Typing,
    Delete(String),
    Download(String),
}

#[derive(Default)]
pub struct FakeChannel {
    calls: Mutex<Vec<Call>>,
    /// Bytes returned by downloads; `None` makes downloads fail.
    pub download: Mutex<Option<Vec<u8>>>,
}

impl FakeChannel {
    pub fn with_download(bytes: &[u8]) -> Self {
        Self {
            download: Mutex::new(Some(bytes.to_vec())),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().filter_map(|m| m.text).collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Channel for FakeChannel {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(
        &self,
        _address: &Address,
        message: OutgoingMessage,
    ) -> Result<Option<String>, IrisError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call::Send(message));
        Ok(Some(format!("out-{}", calls.len())))
    }

    async fn send_typing(&self, _address: &Address) -> Result<(), IrisError> {
        self.calls.lock().unwrap().push(Call::Typing);
        Ok(())
    }

    async fn delete_message(&self, _address: &Address, message_id: &str) -> Result<(), IrisError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(message_id.to_string()));
        Ok(())
    }

    async fn download_authenticated(
        &self,
        url: &str,
        _address: &Address,
    ) -> Result<Vec<u8>, IrisError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Download(url.to_string()));
        self.download
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| IrisError::Channel("download returned 403 Forbidden".into()))
    }
}

/// Analyzer answering with canned results.
pub struct FakeAnalyzer {
    pub describe: Result<DescribeResult, AnalysisError>,
    pub text: Result<TextResult, AnalysisError>,
    pub requests: Mutex<Vec<AnalysisRequest>>,
}

impl FakeAnalyzer {
    pub fn new(
        describe: Result<DescribeResult, AnalysisError>,
        text: Result<TextResult, AnalysisError>,
    ) -> Self {
        Self {
            describe,
            text,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_text(json: &str) -> Self {
        Self::new(
            Ok(DescribeResult::default()),
            Ok(serde_json::from_str(json).unwrap()),
        )
    }

    pub fn with_captions(json: &str) -> Self {
        Self::new(
            Ok(serde_json::from_str(json).unwrap()),
            Ok(TextResult::default()),
        )
    }

    pub fn failing(message: &str) -> Self {
        let err = AnalysisError {
            status_code: Some(400),
            message: message.to_string(),
            raw_body: None,
        };
        Self::new(Err(err.clone()), Err(err))
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    fn name(&self) -> &str {
        "fake-vision"
    }

    async fn describe(
        &self,
        request: &AnalysisRequest,
        _language: Option<&str>,
        _max_candidates: Option<u32>,
    ) -> Result<DescribeResult, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        self.describe.clone()
    }

    async fn recognize_text(
        &self,
        request: &AnalysisRequest,
        _language: Option<&str>,
    ) -> Result<TextResult, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        self.text.clone()
    }
}

/// Uploader answering every PUT with a fixed outcome.
pub struct FakeUploader {
    outcome: Result<(), UploadError>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeUploader {
    pub fn ok() -> Self {
        Self {
            outcome: Ok(()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16, reason: &str) -> Self {
        Self {
            outcome: Err(UploadError::Status {
                status,
                reason: reason.to_string(),
            }),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, upload_url: &str, content: &[u8]) -> Result<(), UploadError> {
        self.uploads
            .lock()
            .unwrap()
            .push((upload_url.to_string(), content.to_vec()));
        self.outcome.clone()
    }
}
