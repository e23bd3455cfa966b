//! Line-oriented wire format shared by the relay server and its clients.
//!
//! Every frame is a single UTF-8 line terminated by `\n`. Client lines are
//! classified into a [`Handshake`] (first line only) or a [`Request`]; server
//! lines are produced from a [`Response`] and read back by clients as a
//! [`ServerEvent`].

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// Longest client line, newline excluded.
pub const MAX_LINE_LEN: usize = 1024;
/// Longest server line: a full client line plus timestamp, sender name and tag.
pub const MAX_SERVER_LINE_LEN: usize = MAX_LINE_LEN + 128;
pub const MAX_NAME_LEN: usize = 64;

// client -> server
const HANDSHAKE: &str = "USERNAME:";
const TYPING: &str = "TYPING";
const TYPING_ALT: &str = "/typing";
const PRIVATE: &str = "/pm";
const USERS: &str = "/users";

// server -> client
const TYPING_EVENT: &str = "TYPING:";
const NOTICE: &str = "SERVER: ";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("expected handshake `USERNAME:<name>`")]
    MissingHandshake,
    #[error("username must not be empty")]
    EmptyName,
    #[error("username `{0}` must not contain whitespace")]
    NameWhitespace(String),
    #[error("username is longer than {} bytes", MAX_NAME_LEN)]
    NameTooLong,
    #[error("private messages look like `/pm <user> <text>`")]
    MalformedPrivate,
    #[error("line of {len} bytes exceeds the {max} byte limit")]
    LineTooLong { len: usize, max: usize },
    #[error(transparent)]
    Codec(#[from] LinesCodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// First line sent by a client, carrying its requested display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub name: String,
}

impl Handshake {
    pub fn new(name: &str) -> Result<Self, ProtocolError> {
        let name = validate_name(name)?;
        Ok(Self { name })
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let name = line
            .trim_start()
            .strip_prefix(HANDSHAKE)
            .ok_or(ProtocolError::MissingHandshake)?;
        Self::new(name)
    }

    pub fn to_line(&self) -> String {
        format!("{}{}", HANDSHAKE, self.name)
    }
}

fn validate_name(name: &str) -> Result<String, ProtocolError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ProtocolError::EmptyName);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ProtocolError::NameWhitespace(name.to_owned()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong);
    }

    Ok(name.to_owned())
}

/// A client line received after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Typing,
    Private { target: String, text: String },
    Users,
    Chat(String),
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let trimmed = line.trim();

        if trimmed == TYPING || trimmed == TYPING_ALT {
            return Ok(Request::Typing);
        }
        if trimmed == USERS {
            return Ok(Request::Users);
        }

        let mut parts = trimmed.splitn(2, char::is_whitespace);
        if parts.next() == Some(PRIVATE) {
            let rest = parts.next().unwrap_or_default().trim_start();
            let (target, text) = rest
                .split_once(char::is_whitespace)
                .ok_or(ProtocolError::MalformedPrivate)?;
            let text = text.trim();

            if text.is_empty() {
                return Err(ProtocolError::MalformedPrivate);
            }

            return Ok(Request::Private {
                target: target.to_owned(),
                text: text.to_owned(),
            });
        }

        Ok(Request::Chat(line.to_owned()))
    }

    pub fn to_line(&self) -> String {
        match self {
            Request::Typing => TYPING.to_owned(),
            Request::Users => USERS.to_owned(),
            Request::Private { target, text } => format!("{} {} {}", PRIVATE, target, text),
            Request::Chat(text) => text.clone(),
        }
    }
}

/// A line the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Chat { time: String, from: String, text: String },
    Private { time: String, from: String, text: String },
    Typing { from: String },
    Notice(String),
}

impl Response {
    pub fn to_line(&self) -> String {
        match self {
            Response::Chat { time, from, text } => format!("[{}] {}: {}", time, from, text),
            Response::Private { time, from, text } => {
                format!("[{}] {} (private): {}", time, from, text)
            }
            Response::Typing { from } => format!("{}{}", TYPING_EVENT, from),
            Response::Notice(msg) => format!("{}{}", NOTICE, msg),
        }
    }
}

/// Server line as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Displayable chat line, public or private.
    Line(String),
    /// Someone is composing a message.
    Typing(String),
    Notice(String),
}

impl ServerEvent {
    pub fn parse(line: &str) -> Self {
        if let Some(name) = line.strip_prefix(TYPING_EVENT) {
            ServerEvent::Typing(name.to_owned())
        } else if let Some(msg) = line.strip_prefix(NOTICE) {
            ServerEvent::Notice(msg.to_owned())
        } else {
            ServerEvent::Line(line.to_owned())
        }
    }
}

/// Newline framing. Decodes raw lines; encodes any of the typed messages
/// above. Client lines are capped at [`MAX_LINE_LEN`], server lines at
/// [`MAX_SERVER_LINE_LEN`], on both the encoding and the decoding side.
#[derive(Debug)]
pub struct RelayCodec {
    lines: LinesCodec,
}

impl RelayCodec {
    /// Codec for the server end: decodes client lines.
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LEN),
        }
    }

    /// Codec for the client end: decodes server lines.
    pub fn client() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_SERVER_LINE_LEN),
        }
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RelayCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.lines.decode(src)?)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.lines.decode_eof(src)?)
    }
}

impl Encoder<Handshake> for RelayCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Handshake, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&mut self.lines, item.to_line(), MAX_LINE_LEN, dst)
    }
}

impl Encoder<Request> for RelayCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&mut self.lines, item.to_line(), MAX_LINE_LEN, dst)
    }
}

impl Encoder<Response> for RelayCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_line(&mut self.lines, item.to_line(), MAX_SERVER_LINE_LEN, dst)
    }
}

// one message, one frame: embedded newlines are flattened, and nothing is
// written that the peer's decoder would refuse
fn encode_line(lines: &mut LinesCodec, line: String, max: usize, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    let line = if line.contains('\n') { line.replace('\n', " ") } else { line };
    if line.len() > max {
        return Err(ProtocolError::LineTooLong { len: line.len(), max });
    }
    dst.reserve(line.len() + 1);
    Ok(lines.encode(line, dst)?)
}
