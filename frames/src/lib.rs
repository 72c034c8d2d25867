//! Text frame codec for the multiplexed session socket.
//!
//! This crate owns the wire representation shared by the client engine, its
//! HTTP fallback backend, and the mock servers used in tests. Frames are plain
//! UTF-8 text split on `:`; only the leading segments are delimited, the
//! trailing JSON body is carried verbatim and may itself contain `:`.
//!
//! WIRE FORMAT
//! ===========
//! - Outbound call:  `{api}:{seq}:{body}`
//! - Reply:          `R:{seq}:{body}`
//! - Error reply:    `E:{seq}:{body}`
//! - Push:           `M:{message_type}:{from_id}:{via_channel}:{body}`
//!
//! Every segment before the body must be free of `:`. The encoders reject a
//! header field that contains one rather than emit a frame that would decode
//! differently.

/// Field delimiter used by every frame shape.
pub const DELIMITER: char = ':';

/// Push message type reserved for server-pushed errors.
pub const ERROR_MESSAGE_TYPE: &str = "error";

/// Error returned by the frame encoders and decoders.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The frame ended before all leading segments were delimited.
    #[error("frame is missing a `:` delimiter")]
    MissingDelimiter,
    /// The leading token is not `R`, `E`, or `M`.
    #[error("unknown frame kind: {0:?}")]
    UnknownKind(String),
    /// The sequence segment is not a non-negative decimal integer.
    #[error("invalid sequence id: {0:?}")]
    InvalidSequence(String),
    /// An outbound call frame carried an empty api name.
    #[error("call frame has an empty api name")]
    EmptyApi,
    /// A header field passed to an encoder contains the `:` delimiter.
    #[error("{field} contains the `:` delimiter: {value:?}")]
    DelimiterInField { field: &'static str, value: String },
}

/// Leading token of an inbound frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Successful reply to a call.
    Reply,
    /// Failed reply to a call.
    Error,
    /// Unsolicited server push.
    Push,
}

impl FrameKind {
    /// Wire token for this kind.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Reply => "R",
            Self::Error => "E",
            Self::Push => "M",
        }
    }

    /// Parse a kind from its wire token.
    fn from_token(token: &str) -> Result<Self, CodecError> {
        match token {
            "R" => Ok(Self::Reply),
            "E" => Ok(Self::Error),
            "M" => Ok(Self::Push),
            other => Err(CodecError::UnknownKind(other.to_owned())),
        }
    }
}

/// A single inbound message on the session socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Successful reply; `payload` is the unparsed reply body.
    Reply { seq: u64, payload: String },
    /// Failed reply; `payload` is the unparsed error body.
    Error { seq: u64, payload: String },
    /// Server-initiated notification not tied to any call.
    Push {
        message_type: String,
        from_id: String,
        via_channel: String,
        payload: String,
    },
}

impl Frame {
    /// Kind tag of this frame.
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Reply { .. } => FrameKind::Reply,
            Self::Error { .. } => FrameKind::Error,
            Self::Push { .. } => FrameKind::Push,
        }
    }

    /// Sequence id for replies, `None` for pushes.
    #[must_use]
    pub fn seq(&self) -> Option<u64> {
        match self {
            Self::Reply { seq, .. } | Self::Error { seq, .. } => Some(*seq),
            Self::Push { .. } => None,
        }
    }

    /// Whether this is a server-pushed error routed to the global error path.
    #[must_use]
    pub fn is_error_push(&self) -> bool {
        matches!(self, Self::Push { message_type, .. } if message_type == ERROR_MESSAGE_TYPE)
    }
}

/// An outbound call as the server sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    /// Case-sensitive method name.
    pub api: String,
    /// Per-connection sequence id.
    pub seq: u64,
    /// Compact JSON request body.
    pub body: String,
}

/// Encode an outbound call frame. The body is appended verbatim.
///
/// # Errors
///
/// Returns [`CodecError::EmptyApi`] for an empty method name and
/// [`CodecError::DelimiterInField`] when the name contains `:`.
pub fn encode_call(api: &str, seq: u64, body: &str) -> Result<String, CodecError> {
    if api.is_empty() {
        return Err(CodecError::EmptyApi);
    }
    check_field("api", api)?;
    Ok(format!("{api}{DELIMITER}{seq}{DELIMITER}{body}"))
}

/// Decode an outbound call frame.
///
/// # Errors
///
/// Returns [`CodecError::MissingDelimiter`] when fewer than two delimiters
/// are present, [`CodecError::EmptyApi`] for an empty method name, and
/// [`CodecError::InvalidSequence`] for a non-numeric sequence id.
pub fn decode_call(raw: &str) -> Result<Call, CodecError> {
    let (api, rest) = raw.split_once(DELIMITER).ok_or(CodecError::MissingDelimiter)?;
    if api.is_empty() {
        return Err(CodecError::EmptyApi);
    }
    let (seq, body) = rest.split_once(DELIMITER).ok_or(CodecError::MissingDelimiter)?;
    Ok(Call { api: api.to_owned(), seq: parse_seq(seq)?, body: body.to_owned() })
}

/// Encode an inbound frame. Used by servers and by the HTTP backend, which
/// synthesizes replies for the shared dispatch path.
///
/// # Errors
///
/// Returns [`CodecError::DelimiterInField`] when a push header field
/// contains `:`. Replies never fail.
pub fn encode_frame(frame: &Frame) -> Result<String, CodecError> {
    let token = frame.kind().token();
    match frame {
        Frame::Reply { seq, payload } | Frame::Error { seq, payload } => {
            Ok(format!("{token}{DELIMITER}{seq}{DELIMITER}{payload}"))
        }
        Frame::Push { message_type, from_id, via_channel, payload } => {
            check_field("message_type", message_type)?;
            check_field("from_id", from_id)?;
            check_field("via_channel", via_channel)?;
            Ok(format!(
                "{token}{DELIMITER}{message_type}{DELIMITER}{from_id}{DELIMITER}{via_channel}{DELIMITER}{payload}"
            ))
        }
    }
}

fn check_field(field: &'static str, value: &str) -> Result<(), CodecError> {
    if value.contains(DELIMITER) {
        return Err(CodecError::DelimiterInField { field, value: value.to_owned() });
    }
    Ok(())
}

/// Decode an inbound frame.
///
/// Only the leading segments are split; everything after the last leading
/// delimiter is the payload, taken verbatim.
///
/// # Errors
///
/// Returns [`CodecError::MissingDelimiter`] for truncated frames,
/// [`CodecError::UnknownKind`] for an unrecognized leading token, and
/// [`CodecError::InvalidSequence`] for a non-numeric reply sequence id.
pub fn decode_frame(raw: &str) -> Result<Frame, CodecError> {
    let (token, rest) = raw.split_once(DELIMITER).ok_or(CodecError::MissingDelimiter)?;

    match FrameKind::from_token(token)? {
        FrameKind::Reply => {
            let (seq, payload) = split_reply(rest)?;
            Ok(Frame::Reply { seq, payload })
        }
        FrameKind::Error => {
            let (seq, payload) = split_reply(rest)?;
            Ok(Frame::Error { seq, payload })
        }
        FrameKind::Push => {
            let mut parts = rest.splitn(4, DELIMITER);
            let (Some(message_type), Some(from_id), Some(via_channel), Some(payload)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(CodecError::MissingDelimiter);
            };
            Ok(Frame::Push {
                message_type: message_type.to_owned(),
                from_id: from_id.to_owned(),
                via_channel: via_channel.to_owned(),
                payload: payload.to_owned(),
            })
        }
    }
}

fn split_reply(rest: &str) -> Result<(u64, String), CodecError> {
    let (seq, payload) = rest.split_once(DELIMITER).ok_or(CodecError::MissingDelimiter)?;
    Ok((parse_seq(seq)?, payload.to_owned()))
}

fn parse_seq(raw: &str) -> Result<u64, CodecError> {
    // `u64::from_str` accepts a leading `+`; the wire does not.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::InvalidSequence(raw.to_owned()));
    }
    raw.parse::<u64>().map_err(|_| CodecError::InvalidSequence(raw.to_owned()))
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
