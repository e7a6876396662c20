//! Input resolution: pick the one image a message refers to.
//!
//! Sources are tried in a fixed order and the first hit wins:
//! a shared file, then an inline (pasted) image, then an image URL in the text.

use iris_core::{
    error::IrisError,
    message::{Address, Attachment, IncomingMessage},
    sanitize::{strip_mentions, strip_query},
    traits::Channel,
    vision::AnalysisRequest,
};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhttps?://[^\s<>"']+\.(?:jpe?g|png|gif|bmp)(?:\?[^\s<>"']*)?"#)
        .expect("image URL pattern is valid")
});

/// Where the image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A shared file with an unauthenticated, short-lived download URL.
    File { download_url: String, name: String },
    /// A pasted image; fetching it needs the bot's credential.
    Inline { content_url: String },
    /// An image URL found in the message text.
    TextUrl { url: String },
}

impl ImageSource {
    /// Telemetry label for the source.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Inline { .. } => "inline",
            Self::TextUrl { .. } => "url",
        }
    }

    /// Name of the shared file, when there is one.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::File { name, .. } if !name.is_empty() => Some(name),
            _ => None,
        }
    }
}

/// Select the image source for `message`, if any.
pub fn resolve(message: &IncomingMessage) -> Option<ImageSource> {
    let file = message.attachments.iter().find_map(|a| match a {
        Attachment::FileDownload {
            name, download_url, ..
        } => Some(ImageSource::File {
            download_url: download_url.clone(),
            name: name.clone(),
        }),
        _ => None,
    });
    if file.is_some() {
        return file;
    }

    let inline = message.attachments.iter().find_map(|a| match a {
        Attachment::InlineImage { content_url, .. } => Some(ImageSource::Inline {
            content_url: content_url.clone(),
        }),
        _ => None,
    });
    if inline.is_some() {
        return inline;
    }

    find_image_url(&message.text).map(|url| ImageSource::TextUrl { url })
}

/// First image URL in `text`, ignoring bot mentions.
pub fn find_image_url(text: &str) -> Option<String> {
    let text = strip_mentions(text);
    IMAGE_URL.find(&text).map(|m| m.as_str().to_string())
}

/// Turn a resolved source into an analysis request, downloading inline
/// images through the channel.
pub async fn fetch(
    source: &ImageSource,
    channel: &dyn Channel,
    address: &Address,
) -> Result<AnalysisRequest, IrisError> {
    match source {
        ImageSource::File { download_url, .. } => Ok(AnalysisRequest::Url(download_url.clone())),
        ImageSource::TextUrl { url } => Ok(AnalysisRequest::Url(url.clone())),
        ImageSource::Inline { content_url } => {
            debug!("fetching inline image {}", strip_query(content_url));
            let bytes = channel.download_authenticated(content_url, address).await?;
            Ok(AnalysisRequest::Bytes(bytes))
        }
    }
}
