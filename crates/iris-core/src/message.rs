use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlation::CorrelationId;

/// A user or bot account on the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Kind of conversation a message belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConversationType {
    /// One-to-one chat with the bot.
    #[default]
    Personal,
    GroupChat,
    Channel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub id: String,
    #[serde(default)]
    pub conversation_type: ConversationType,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Everything needed to reply into a conversation.
///
/// Rebuilt from every inbound activity. The correlation id lives here so that
/// every record emitted while handling the activity can be stitched together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Platform channel id (e.g. "msteams").
    pub channel_id: String,
    /// Base URL of the connector service that delivered the activity.
    pub service_url: String,
    pub bot: Account,
    pub user: Account,
    pub conversation: ConversationRef,
    /// Id of the inbound activity this address was built from.
    #[serde(default)]
    pub activity_id: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub team_channel_id: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
}

impl Address {
    /// Key of the per-conversation state slot.
    ///
    /// Scoped by bot so two bots sharing a store never see each other's state.
    pub fn conversation_key(&self) -> String {
        format!("{}:{}", self.bot.id, self.conversation.id)
    }

    pub fn is_personal(&self) -> bool {
        self.conversation.conversation_type == ConversationType::Personal
    }
}

/// An incoming chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub address: Address,
    /// Message text with bot mentions still in place.
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
}

/// An attachment on an incoming message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attachment {
    /// A file shared through the platform's file picker. `download_url` is
    /// unauthenticated and only valid for a few minutes.
    FileDownload {
        name: String,
        download_url: String,
        unique_id: Option<String>,
        file_type: Option<String>,
    },
    /// An image pasted into the compose box; fetching it requires the bot's token.
    InlineImage {
        content_type: String,
        content_url: String,
    },
    /// Anything else (cards, mentions, HTML bodies).
    Other { content_type: String },
}

/// Formatting hint for outgoing text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    #[default]
    Markdown,
    Plain,
    /// Sent verbatim; used when markdown would mangle the text.
    Xml,
}

/// Context echoed back by the platform when the user answers a consent card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentContext {
    pub result_id: String,
    #[serde(default)]
    pub correlation_id: String,
}

/// Outbound cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Card {
    /// Asks the user for permission to write a file into their storage.
    FileConsent {
        name: String,
        description: String,
        size_in_bytes: usize,
        context: ConsentContext,
    },
    /// Links to a file that was uploaded.
    FileInfo {
        name: String,
        content_url: String,
        unique_id: String,
        file_type: String,
    },
}

/// An outgoing message to send through a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: Option<String>,
    #[serde(default)]
    pub text_format: TextFormat,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn card(card: Card) -> Self {
        Self {
            cards: vec![card],
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: TextFormat) -> Self {
        self.text_format = format;
        self
    }
}

/// Upload target supplied by the platform when the user accepts a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    pub name: String,
    pub upload_url: String,
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub unique_id: String,
    #[serde(default)]
    pub file_type: String,
}

/// The user's answer to a consent card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentAction {
    Accept(UploadInfo),
    Decline,
}

impl ConsentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept(_) => "accept",
            Self::Decline => "decline",
        }
    }
}

/// An out-of-band decision event, delivered separately from messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionEvent {
    pub address: Address,
    /// Id of the consent card the user clicked.
    pub reply_to_id: Option<String>,
    pub action: ConsentAction,
    pub context: ConsentContext,
}

/// Inbound activity after the channel has classified it.
#[derive(Debug, Clone)]
pub enum InboundActivity {
    Message(IncomingMessage),
    Decision(DecisionEvent),
    /// An invoke whose name or payload the bot does not handle.
    UnknownInvoke { address: Address, name: String },
    /// Conversation updates, reactions, and the like.
    Ignored { address: Address, kind: String },
}

impl InboundActivity {
    pub fn address(&self) -> &Address {
        match self {
            Self::Message(m) => &m.address,
            Self::Decision(d) => &d.address,
            Self::UnknownInvoke { address, .. } | Self::Ignored { address, .. } => address,
        }
    }

    pub fn address_mut(&mut self) -> &mut Address {
        match self {
            Self::Message(m) => &mut m.address,
            Self::Decision(d) => &mut d.address,
            Self::UnknownInvoke { address, .. } | Self::Ignored { address, .. } => address,
        }
    }
}
