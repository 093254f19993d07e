//! RouterOS API wire format
//!
//! A sentence is a sequence of length-prefixed words terminated by a
//! zero-length word. Lengths use a variable-width big-endian encoding:
//!
//! | length             | bytes | marker        |
//! |--------------------|-------|---------------|
//! | `< 0x80`           | 1     | none          |
//! | `< 0x4000`         | 2     | `0x8000`      |
//! | `< 0x20_0000`      | 3     | `0xC0_0000`   |
//! | `< 0x1000_0000`    | 4     | `0xE000_0000` |
//! | otherwise          | 5     | `0xF0` prefix |
//!
//! Replies start with `!re`, `!done`, `!trap`, `!fatal` or `!empty`, followed
//! by `=key=value` attribute words.

use mtsync_core::{Error, Result};
use std::collections::BTreeMap;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Attributes of one reply sentence
pub type Attributes = BTreeMap<String, String>;

/// Kind of a reply sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// One result row
    Re,
    /// End of the reply
    Done,
    /// Command failed; a `!done` follows
    Trap,
    /// Session is being closed by the router
    Fatal,
    /// Empty result (RouterOS 7.18+); a `!done` follows
    Empty,
}

/// One decoded reply sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub attributes: Attributes,
    /// Free-form words, e.g. the reason text of a `!fatal`
    pub words: Vec<String>,
}

impl Reply {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Best-effort human readable error text of a `!trap` or `!fatal`
    pub fn message(&self) -> String {
        self.attribute("message")
            .map(str::to_string)
            .or_else(|| self.words.first().cloned())
            .unwrap_or_else(|| "no message".to_string())
    }

    fn parse(sentence: Vec<String>) -> Result<Self> {
        let mut words = sentence.into_iter();
        let kind = match words.next().as_deref() {
            Some("!re") => ReplyKind::Re,
            Some("!done") => ReplyKind::Done,
            Some("!trap") => ReplyKind::Trap,
            Some("!fatal") => ReplyKind::Fatal,
            Some("!empty") => ReplyKind::Empty,
            Some(other) => return Err(protocol_error(format!("unexpected reply word {:?}", other))),
            None => return Err(protocol_error("empty reply sentence")),
        };

        let mut attributes = Attributes::new();
        let mut free = Vec::new();
        for word in words {
            match word.strip_prefix('=').and_then(|rest| rest.split_once('=')) {
                Some((key, value)) => {
                    attributes.insert(key.to_string(), value.to_string());
                }
                // `.tag=` and API attributes are not used by this client
                None if word.starts_with('.') => {}
                None => free.push(word),
            }
        }

        Ok(Self {
            kind,
            attributes,
            words: free,
        })
    }
}

/// Largest word accepted from the router
pub const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Malformed input from the router; the session cannot be trusted after this
pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg.into()))
}

/// Encode a word length prefix
pub fn encode_length(len: usize) -> Vec<u8> {
    let len = len as u32;
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x4000 {
        (len | 0x8000).to_be_bytes()[2..].to_vec()
    } else if len < 0x20_0000 {
        (len | 0xC0_0000).to_be_bytes()[1..].to_vec()
    } else if len < 0x1000_0000 {
        (len | 0xE000_0000).to_be_bytes().to_vec()
    } else {
        let mut out = vec![0xF0];
        out.extend_from_slice(&len.to_be_bytes());
        out
    }
}

/// Encode a whole sentence, including the terminating empty word
pub fn encode_sentence<S: AsRef<str>>(words: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for word in words {
        let bytes = word.as_ref().as_bytes();
        out.extend(encode_length(bytes.len()));
        out.extend_from_slice(bytes);
    }
    out.push(0);
    out
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<usize> {
    let first = reader.read_u8().await?;

    let (extra, initial) = if first & 0x80 == 0x00 {
        (0, u32::from(first))
    } else if first & 0xC0 == 0x80 {
        (1, u32::from(first & 0x3F))
    } else if first & 0xE0 == 0xC0 {
        (2, u32::from(first & 0x1F))
    } else if first & 0xF0 == 0xE0 {
        (3, u32::from(first & 0x0F))
    } else if first == 0xF0 {
        (4, 0)
    } else {
        return Err(protocol_error(format!("invalid length prefix 0x{:02X}", first)));
    };

    let mut len = initial;
    for _ in 0..extra {
        len = (len << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(len as usize)
}

/// Read one sentence; the terminating empty word is not included
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<String>> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(protocol_error(format!(
                "word length {} exceeds limit of {} bytes",
                len, MAX_WORD_LEN
            )));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        let word = String::from_utf8(buf).map_err(|e| protocol_error(format!("non UTF-8 word: {}", e)))?;
        words.push(word);
    }
}

/// Read and classify one reply sentence
pub async fn read_reply<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Reply> {
    loop {
        let sentence = read_sentence(reader).await?;
        // Stray empty sentences carry nothing
        if !sentence.is_empty() {
            return Reply::parse(sentence);
        }
    }
}

/// Write one sentence and flush
pub async fn write_sentence<W, S>(writer: &mut W, words: &[S]) -> Result<()>
where
    W: AsyncWrite + Unpin,
    S: AsRef<str>,
{
    writer.write_all(&encode_sentence(words)).await?;
    writer.flush().await?;
    Ok(())
}
