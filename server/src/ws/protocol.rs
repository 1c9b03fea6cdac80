//! Wire format for socket payloads.
//!
//! Every frame carries a JSON object `{"type", "content", "chat_id", "user_id"}`.
//! When the outbound pump coalesces several queued envelopes into one write,
//! the serialized objects are joined with [`BATCH_SEPARATOR`].

use serde::{Deserialize, Serialize};

use super::{ChatId, UserId};

/// Kind used for ordinary chat messages.
pub const KIND_MESSAGE: &str = "message";

/// Server-originated notice that the recipient was added to a new private chat.
/// `content` carries the chat name.
pub const KIND_CHAT_CREATED: &str = "chat_created";

/// Delimiter between envelopes coalesced into a single text frame.
pub const BATCH_SEPARATOR: char = '\n';

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The unit routed by the hub.
///
/// Fields are private so an envelope cannot be altered after construction;
/// [`Envelope::with_sender`] produces a re-stamped copy instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    content: String,
    chat_id: ChatId,
    /// Ignored on input; always replaced by the authenticated identity.
    #[serde(default)]
    user_id: UserId,
}

impl Envelope {
    pub fn new(
        kind: impl Into<String>,
        content: impl Into<String>,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
            chat_id,
            user_id,
        }
    }

    /// Build a plain chat message envelope.
    pub fn message(content: impl Into<String>, chat_id: ChatId, user_id: UserId) -> Self {
        Self::new(KIND_MESSAGE, content, chat_id, user_id)
    }

    /// Copy of this envelope attributed to `user_id`.
    pub fn with_sender(self, user_id: UserId) -> Self {
        Self { user_id, ..self }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Decode one envelope from a raw socket payload (text or binary frame).
pub fn decode(payload: &[u8]) -> Result<Envelope, ProtocolError> {
    let text = std::str::from_utf8(payload)?;
    serde_json::from_str(text.trim()).map_err(ProtocolError::Decode)
}

pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(ProtocolError::Encode)
}

/// Serialize several envelopes into one frame, separated by [`BATCH_SEPARATOR`].
pub fn encode_batch(envelopes: &[Envelope]) -> Result<String, ProtocolError> {
    let mut frame = String::new();
    for (i, envelope) in envelopes.iter().enumerate() {
        if i > 0 {
            frame.push(BATCH_SEPARATOR);
        }
        frame.push_str(&encode(envelope)?);
    }
    Ok(frame)
}

/// Split a (possibly batched) frame back into its envelopes.
pub fn decode_batch(frame: &str) -> Result<Vec<Envelope>, ProtocolError> {
    frame
        .split(BATCH_SEPARATOR)
        .filter(|part| !part.trim().is_empty())
        .map(|part| decode(part.as_bytes()))
        .collect()
}
