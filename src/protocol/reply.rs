//! RESP Reply Model
//!
//! This module defines the closed set of values that travel over the wire,
//! both as decoded requests and as replies written back to clients.
//!
//! ## Protocol Format
//!
//! Each reply starts with a type prefix byte:
//! - `+` Status
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `*` Multi Bulk (array of bulk strings)
//!
//! Everything is terminated with CRLF (`\r\n`), except [`Reply::NoReply`],
//! which serializes to nothing at all.
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Multi Bulk: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Null Bulk String: `$-1\r\n`

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const MULTI_BULK: u8 = b'*';
}

const NULL_BULK: &[u8] = b"$-1\r\n";
const EMPTY_MULTI_BULK: &[u8] = b"*0\r\n";

/// A single RESP value.
///
/// The same type is used for frames decoded from a client and for replies
/// produced by a command executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status line, e.g. `+OK\r\n`. CR and LF are written as spaces.
    Status(String),

    /// Error line, e.g. `-ERR syntax error\r\n`. CR and LF are written as
    /// spaces.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string. `None` is the null bulk string (`$-1\r\n`).
    Bulk(Option<Bytes>),

    /// Array of bulk strings; any element may be null.
    MultiBulk(Vec<Option<Bytes>>),

    /// Array with no elements (`*0\r\n`).
    EmptyMultiBulk,

    /// Serializes to zero bytes. Used when a command has nothing to send.
    NoReply,
}

impl Reply {
    /// Creates a status reply.
    ///
    /// # Example
    /// ```
    /// use flashresp::protocol::Reply;
    /// assert_eq!(Reply::status("OK").to_bytes(), b"+OK\r\n");
    /// ```
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use flashresp::protocol::Reply;
    /// let err = Reply::error("ERR unknown command");
    /// assert!(err.is_error());
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a non-null bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// Creates the null bulk string reply.
    pub fn null_bulk() -> Self {
        Reply::Bulk(None)
    }

    /// Creates a multi bulk reply from non-null elements.
    pub fn multi_bulk<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Reply::MultiBulk(items.into_iter().map(|b| Some(b.into())).collect())
    }

    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    /// `-ERR unknown error`
    pub fn unknown_error() -> Self {
        Reply::Error("ERR unknown error".to_string())
    }

    /// `-ERR wrong number of arguments for '<cmd>' command`
    pub fn arg_num_error(cmd: &str) -> Self {
        Reply::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            cmd
        ))
    }

    /// `-ERR syntax error`
    pub fn syntax_error() -> Self {
        Reply::Error("ERR syntax error".to_string())
    }

    /// `-WRONGTYPE ...`
    pub fn wrong_type_error() -> Self {
        Reply::Error(
            "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
        )
    }

    /// Reports unexpected bytes found while decoding a request, e.g.
    /// `-protocol error: '*abc'`.
    pub fn protocol_error(msg: impl fmt::Display) -> Self {
        Reply::Error(format!("protocol error: '{}'", msg))
    }

    /// Serializes the reply to its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    ///
    /// Handy when several replies are batched into one write.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => write_simple(buf, prefix::STATUS, s.as_bytes()),
            Reply::Error(s) => write_simple(buf, prefix::ERROR, s.as_bytes()),
            Reply::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            Reply::Bulk(data) => write_bulk(buf, data.as_deref()),
            Reply::MultiBulk(items) => {
                write_line(buf, prefix::MULTI_BULK, items.len().to_string().as_bytes());
                for item in items {
                    write_bulk(buf, item.as_deref());
                }
            }
            Reply::EmptyMultiBulk => buf.extend_from_slice(EMPTY_MULTI_BULK),
            Reply::NoReply => {}
        }
    }

    /// Returns true if the encoded reply starts with the error prefix.
    pub fn is_error(&self) -> bool {
        is_error_reply(&self.to_bytes())
    }

    /// Returns true for the null bulk string.
    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Bulk(None))
    }
}

/// Inspects an already encoded reply and reports whether it is an error.
pub fn is_error_reply(encoded: &[u8]) -> bool {
    encoded.first() == Some(&prefix::ERROR)
}

fn write_line(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
}

/// Writes a single-line reply. A stray CR or LF would end the line early
/// and desync the client, so both become spaces.
fn write_simple(buf: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    buf.push(prefix);
    buf.extend(body.iter().map(|&b| match b {
        b'\r' | b'\n' => b' ',
        b => b,
    }));
    buf.extend_from_slice(CRLF);
}

fn write_bulk(buf: &mut Vec<u8>, data: Option<&[u8]>) {
    match data {
        Some(data) => {
            write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
            buf.extend_from_slice(data);
            buf.extend_from_slice(CRLF);
        }
        None => buf.extend_from_slice(NULL_BULK),
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => fmt_bulk(f, data.as_deref()),
            Reply::MultiBulk(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) ", i + 1)?;
                    fmt_bulk(f, item.as_deref())?;
                }
                Ok(())
            }
            Reply::EmptyMultiBulk => write!(f, "(empty array)"),
            Reply::NoReply => Ok(()),
        }
    }
}

fn fmt_bulk(f: &mut fmt::Formatter<'_>, data: Option<&[u8]>) -> fmt::Result {
    match data {
        None => write!(f, "(nil)"),
        Some(data) => match std::str::from_utf8(data) {
            Ok(s) => write!(f, "\"{}\"", s),
            Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
        },
    }
}
