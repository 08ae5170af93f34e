//! Message model and request payload
//!
//! The send endpoint takes one flat JSON object: recipient and agent fields,
//! `msgtype`, a body object named after the msgtype, and optionally
//! `safe: 1`. `SendPayload` assembles that object from typed parts:
//!
//! ```json
//! {"touser":"@all","agentid":1000002,"enable_duplicate_check":0,
//!  "msgtype":"text","text":{"content":"hello"},"safe":1}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::Error;

/// Fields applied to every outgoing message unless overridden per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultFields {
    /// `|`-separated user ids, or `@all`
    #[serde(rename = "touser", skip_serializing_if = "String::is_empty")]
    pub to_user: String,
    /// `|`-separated department ids
    #[serde(rename = "toparty", skip_serializing_if = "String::is_empty")]
    pub to_party: String,
    /// `|`-separated tag ids
    #[serde(rename = "totag", skip_serializing_if = "String::is_empty")]
    pub to_tag: String,
    #[serde(rename = "agentid")]
    pub agent_id: u64,
    #[serde(serialize_with = "serialize_flag")]
    pub enable_duplicate_check: bool,
    /// Seconds; the platform defaults to 1800 when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_check_interval: Option<u32>,
}

fn serialize_flag<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*flag))
}

impl DefaultFields {
    /// Broadcast to the whole visible range of `agent_id`.
    pub fn new(agent_id: u64) -> Self {
        Self {
            to_user: "@all".into(),
            to_party: String::new(),
            to_tag: String::new(),
            agent_id,
            enable_duplicate_check: false,
            duplicate_check_interval: None,
        }
    }

    /// Defaults with any recipient overrides from `options` applied.
    pub fn merged(&self, options: &SendOptions) -> Self {
        let mut fields = self.clone();
        if let Some(to_user) = &options.to_user {
            fields.to_user = to_user.clone();
        }
        if let Some(to_party) = &options.to_party {
            fields.to_party = to_party.clone();
        }
        if let Some(to_tag) = &options.to_tag {
            fields.to_tag = to_tag.clone();
        }
        fields
    }
}

/// Per-call options layered over `DefaultFields`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Mark the message confidential. Ignored for textcard and markdown.
    pub safe: bool,
    pub to_user: Option<String>,
    pub to_party: Option<String>,
    pub to_tag: Option<String>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = safe;
        self
    }

    pub fn to_user(mut self, to_user: impl Into<String>) -> Self {
        self.to_user = Some(to_user.into());
        self
    }

    pub fn to_party(mut self, to_party: impl Into<String>) -> Self {
        self.to_party = Some(to_party.into());
        self
    }

    pub fn to_tag(mut self, to_tag: impl Into<String>) -> Self {
        self.to_tag = Some(to_tag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextBody {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaBody {
    pub media_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextCardBody {
    pub title: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsBody {
    pub articles: Vec<Article>,
}

/// One entry of a news message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub picurl: String,
}

impl Article {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            url: url.into(),
            picurl: String::new(),
        }
    }

    pub fn with_picurl(mut self, picurl: impl Into<String>) -> Self {
        self.picurl = picurl.into();
        self
    }
}

/// Message body, tagged by `msgtype`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "msgtype", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Text { text: TextBody },
    Image { image: MediaBody },
    File { file: MediaBody },
    TextCard { textcard: TextCardBody },
    News { news: NewsBody },
    Markdown { markdown: TextBody },
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            text: TextBody {
                content: content.into(),
            },
        }
    }

    pub fn image(media_id: impl Into<String>) -> Self {
        Self::Image {
            image: MediaBody {
                media_id: media_id.into(),
            },
        }
    }

    pub fn file(media_id: impl Into<String>) -> Self {
        Self::File {
            file: MediaBody {
                media_id: media_id.into(),
            },
        }
    }

    pub fn text_card(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::TextCard {
            textcard: TextCardBody {
                title: title.into(),
                description: description.into(),
                url: url.into(),
            },
        }
    }

    pub fn news(articles: Vec<Article>) -> Self {
        Self::News {
            news: NewsBody { articles },
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self::Markdown {
            markdown: TextBody {
                content: content.into(),
            },
        }
    }

    /// Wire value of `msgtype`.
    pub fn msgtype(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::File { .. } => "file",
            Self::TextCard { .. } => "textcard",
            Self::News { .. } => "news",
            Self::Markdown { .. } => "markdown",
        }
    }

    /// Whether the platform accepts `safe` for this msgtype.
    pub fn supports_safe(&self) -> bool {
        matches!(
            self,
            Self::Text { .. } | Self::Image { .. } | Self::File { .. } | Self::News { .. }
        )
    }
}

/// Complete body for `/cgi-bin/message/send`.
#[derive(Debug, Serialize)]
pub struct SendPayload<'a> {
    #[serde(flatten)]
    pub fields: DefaultFields,
    #[serde(flatten)]
    pub message: &'a OutgoingMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe: Option<u8>,
}

/// Merge defaults, per-call options and the message into one payload.
///
/// `safe` is only emitted when requested and supported by the msgtype.
pub fn build_payload<'a>(
    defaults: &DefaultFields,
    message: &'a OutgoingMessage,
    options: &SendOptions,
) -> SendPayload<'a> {
    SendPayload {
        fields: defaults.merged(options),
        message,
        safe: (options.safe && message.supports_safe()).then_some(1),
    }
}

/// Successful send response.
///
/// The platform delivers to the valid subset of recipients and lists the
/// rest here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub msgid: String,
    #[serde(default, rename = "invaliduser")]
    pub invalid_user: String,
    #[serde(default, rename = "invalidparty")]
    pub invalid_party: String,
    #[serde(default, rename = "invalidtag")]
    pub invalid_tag: String,
}

impl SendReceipt {
    pub fn has_invalid_recipients(&self) -> bool {
        !(self.invalid_user.is_empty() && self.invalid_party.is_empty() && self.invalid_tag.is_empty())
    }
}

/// Upload category for `/cgi-bin/media/upload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Voice,
    Video,
    File,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Voice => "voice",
            MediaType::Video => "video",
            MediaType::File => "file",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "voice" => Ok(MediaType::Voice),
            "video" => Ok(MediaType::Video),
            "file" => Ok(MediaType::File),
            other => Err(Error::InvalidMediaType(other.to_string())),
        }
    }
}
