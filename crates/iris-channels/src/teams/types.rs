//! Bot Framework activity wire types and their conversion to Iris messages.

use chrono::{DateTime, Utc};
use iris_core::{
    error::IrisError,
    message::{
        Account, Address, Attachment, Card, ConsentAction, ConsentContext, ConversationRef,
        ConversationType, DecisionEvent, InboundActivity, IncomingMessage, OutgoingMessage,
        TextFormat, UploadInfo,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub(crate) const FILE_DOWNLOAD_INFO: &str = "application/vnd.microsoft.teams.file.download.info";
pub(crate) const FILE_CONSENT_CARD: &str = "application/vnd.microsoft.teams.card.file.consent";
pub(crate) const FILE_INFO_CARD: &str = "application/vnd.microsoft.teams.card.file.info";

/// Invoke name the platform uses for consent card answers.
pub const FILE_CONSENT_INVOKE: &str = "fileConsent/invoke";

/// A Bot Framework activity, inbound or outbound.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_format: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<WireAttachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachment {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// Content of a `file.download.info` attachment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDownloadContent {
    download_url: String,
    #[serde(default)]
    unique_id: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
}

/// `value` of a `fileConsent/invoke` activity.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConsentValue {
    action: String,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    upload_info: Option<UploadInfo>,
}

/// Classify an inbound activity.
///
/// Fails only when the activity cannot be addressed at all.
pub fn parse_activity(activity: Activity) -> Result<InboundActivity, IrisError> {
    let address = address_of(&activity)?;

    match activity.kind.as_str() {
        "message" => {
            let timestamp = activity
                .timestamp
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            let attachments = activity.attachments.into_iter().map(classify).collect();
            Ok(InboundActivity::Message(IncomingMessage {
                id: Uuid::new_v4(),
                address,
                text: activity.text.unwrap_or_default(),
                attachments,
                timestamp,
            }))
        }
        "invoke" => {
            let name = activity.name.unwrap_or_default();
            if name != FILE_CONSENT_INVOKE {
                return Ok(InboundActivity::UnknownInvoke { address, name });
            }
            let Some(value) = activity
                .value
                .and_then(|v| serde_json::from_value::<FileConsentValue>(v).ok())
            else {
                return Ok(InboundActivity::UnknownInvoke { address, name });
            };
            let action = match (value.action.as_str(), value.upload_info) {
                ("accept", Some(info)) => ConsentAction::Accept(info),
                ("decline", _) => ConsentAction::Decline,
                _ => return Ok(InboundActivity::UnknownInvoke { address, name }),
            };
            Ok(InboundActivity::Decision(DecisionEvent {
                address,
                reply_to_id: activity.reply_to_id,
                action,
                context: consent_context(value.context),
            }))
        }
        other => Ok(InboundActivity::Ignored {
            address,
            kind: other.to_string(),
        }),
    }
}

/// Read the echoed consent context. Missing fields come back empty so the
/// decision can still be judged (and rejected) against the staged result.
fn consent_context(raw: Option<Value>) -> ConsentContext {
    let field = |name: &str| {
        raw.as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    ConsentContext {
        result_id: field("resultId"),
        correlation_id: field("correlationId"),
    }
}

fn classify(attachment: WireAttachment) -> Attachment {
    if attachment.content_type == FILE_DOWNLOAD_INFO {
        if let Some(content) = attachment
            .content
            .and_then(|c| serde_json::from_value::<FileDownloadContent>(c).ok())
        {
            return Attachment::FileDownload {
                name: attachment.name.unwrap_or_default(),
                download_url: content.download_url,
                unique_id: content.unique_id,
                file_type: content.file_type,
            };
        }
        return Attachment::Other {
            content_type: attachment.content_type,
        };
    }

    match attachment.content_url {
        Some(url) if attachment.content_type.starts_with("image/") => Attachment::InlineImage {
            content_type: attachment.content_type,
            content_url: url,
        },
        _ => Attachment::Other {
            content_type: attachment.content_type,
        },
    }
}

fn address_of(activity: &Activity) -> Result<Address, IrisError> {
    let conversation = activity
        .conversation
        .as_ref()
        .ok_or_else(|| IrisError::Channel("activity has no conversation".into()))?;
    let channel_data = activity.channel_data.as_ref();
    let data_id = |path: &[&str]| {
        let mut node = channel_data?;
        for key in path {
            node = node.get(key)?;
        }
        node.as_str().map(str::to_string)
    };

    let conversation_type = match conversation.conversation_type.as_deref() {
        Some("groupChat") => ConversationType::GroupChat,
        Some("channel") => ConversationType::Channel,
        _ => ConversationType::Personal,
    };

    Ok(Address {
        channel_id: activity.channel_id.clone().unwrap_or_default(),
        service_url: activity.service_url.clone().unwrap_or_default(),
        bot: account(activity.recipient.as_ref()),
        user: account(activity.from.as_ref()),
        conversation: ConversationRef {
            id: conversation.id.clone(),
            conversation_type,
            tenant_id: conversation
                .tenant_id
                .clone()
                .or_else(|| data_id(&["tenant", "id"])),
        },
        activity_id: activity.id.clone(),
        team_id: data_id(&["team", "id"]),
        team_channel_id: data_id(&["channel", "id"]),
        correlation_id: None,
    })
}

fn account(raw: Option<&ChannelAccount>) -> Account {
    raw.map(|a| Account {
        id: a.id.clone(),
        name: a.name.clone(),
    })
    .unwrap_or_default()
}

fn wire_account(account: &Account) -> ChannelAccount {
    ChannelAccount {
        id: account.id.clone(),
        name: account.name.clone(),
    }
}

/// Skeleton of an activity sent by the bot into `address`.
fn reply_skeleton(kind: &str, address: &Address) -> Activity {
    Activity {
        kind: kind.to_string(),
        channel_id: Some(address.channel_id.clone()),
        from: Some(wire_account(&address.bot)),
        recipient: Some(wire_account(&address.user)),
        conversation: Some(ConversationAccount {
            id: address.conversation.id.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the outbound activity for a message.
pub fn outgoing_activity(address: &Address, message: &OutgoingMessage) -> Activity {
    let mut activity = reply_skeleton("message", address);
    if let Some(text) = &message.text {
        activity.text = Some(text.clone());
        activity.text_format = Some(
            match message.text_format {
                TextFormat::Markdown => "markdown",
                TextFormat::Plain => "plain",
                TextFormat::Xml => "xml",
            }
            .to_string(),
        );
    }
    activity.attachments = message.cards.iter().map(card_attachment).collect();
    activity
}

pub fn typing_activity(address: &Address) -> Activity {
    reply_skeleton("typing", address)
}

fn card_attachment(card: &Card) -> WireAttachment {
    match card {
        Card::FileConsent {
            name,
            description,
            size_in_bytes,
            context,
        } => {
            let context = serde_json::to_value(context).unwrap_or(Value::Null);
            WireAttachment {
                content_type: FILE_CONSENT_CARD.to_string(),
                name: Some(name.clone()),
                content: Some(serde_json::json!({
                    "description": description,
                    "sizeInBytes": size_in_bytes,
                    "acceptContext": context,
                    "declineContext": context,
                })),
                ..Default::default()
            }
        }
        Card::FileInfo {
            name,
            content_url,
            unique_id,
            file_type,
        } => WireAttachment {
            content_type: FILE_INFO_CARD.to_string(),
            content_url: Some(content_url.clone()),
            name: Some(name.clone()),
            content: Some(serde_json::json!({
                "uniqueId": unique_id,
                "fileType": file_type,
            })),
        },
    }
}
