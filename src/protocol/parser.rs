//! Incremental RESP Frame Parser
//!
//! The parser pulls bytes from any [`AsyncRead`] and yields one [`Payload`]
//! per completed frame or per error. It never needs a whole frame to be
//! buffered up front: every read only asks for the next line, or for exactly
//! the number of bytes a length header promised.
//!
//! ## State Machine
//!
//! ```text
//!                      ┌──────────────────────┐
//!          ┌──────────>│   AwaitingHeader     │<────────────┐
//!          │           └──────────┬───────────┘             │
//!          │                      │                         │
//!          │     *<n>, n > 0      │      $<n>, n >= 0       │
//!          │          ┌───────────┴───────────┐             │
//!          │          ▼                       ▼             │
//!   ┌──────┴───────────────────┐   ┌────────────────────┐   │
//!   │  ReadingMultiBulkBody    │   │  ReadingBulkBody   │───┘
//!   │  $<len> then <len> bytes │   │  <len> bytes       │ frame done
//!   └──────────────────────────┘   └────────────────────┘
//!          frame done / protocol error → reset
//! ```
//!
//! Lines are read up to `\n` only while no length is owed, and never past
//! [`MAX_LINE_LEN`]. Once a `$<len>` header has been seen the next read takes
//! exactly `len + 2` bytes, so binary payloads containing `\r\n` are never
//! scanned. The body buffer grows as bytes arrive; a large declared length
//! alone reserves almost nothing.
//!
//! ## Errors
//!
//! - I/O failures (including EOF) are fatal. They are delivered as the last
//!   payload, after which [`FrameReader::next_payload`] returns `None`.
//! - Malformed headers or bodies are protocol errors. The state is reset and
//!   the next bytes are parsed as a fresh frame.

use crate::protocol::reply::{prefix, Reply, CRLF};
use bytes::Bytes;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::trace;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a header or simple line, terminator included (64 KB,
/// same as Redis' inline limit).
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Upper bound on the capacity reserved up front for a multi bulk header.
/// Larger arrays still parse; the vector just grows as elements arrive.
const MAX_PREALLOCATED_ARGS: usize = 1024;

/// Upper bound on the buffer reserved before a bulk body arrives. The
/// buffer grows with the bytes actually received, never with the declared
/// length alone.
const MAX_PREALLOCATED_BODY: usize = 16 * 1024;

/// Errors produced while decoding a byte stream.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The stream ended cleanly between frames.
    #[error("EOF")]
    Eof,

    /// The stream ended in the middle of a frame.
    #[error("unexpected EOF")]
    UnexpectedEof,

    /// The underlying reader failed.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The bytes do not form a valid frame. Recoverable.
    #[error("protocol error: '{0}'")]
    Protocol(String),
}

impl ParseError {
    fn protocol(line: &[u8]) -> Self {
        ParseError::Protocol(line.escape_ascii().to_string())
    }

    /// Returns true if the stream can no longer be read.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ParseError::Protocol(_))
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => ParseError::UnexpectedEof,
            _ => ParseError::Io(err),
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// One parser output: a decoded frame or the error that prevented it.
pub type Payload = ParseResult<Reply>;

/// Per-connection decoding state.
///
/// Reset to `ReadState::default()` after every completed frame and after
/// every protocol error.
#[derive(Debug, Default)]
struct ReadState {
    reading_multi_line: bool,
    expected_args: usize,
    msg_type: u8,
    args: Vec<Option<Bytes>>,
    /// Bytes owed for the current element. `None` reads up to CRLF.
    bulk_len: Option<usize>,
}

impl ReadState {
    fn finished(&self) -> bool {
        self.expected_args > 0 && self.args.len() == self.expected_args
    }

    /// Feeds one line (terminator already stripped) through the state machine.
    ///
    /// Returns `Ok(Some(frame))` once a frame is complete, `Ok(None)` while
    /// more lines are needed.
    fn consume(&mut self, line: Vec<u8>) -> ParseResult<Option<Reply>> {
        if self.bulk_len.take().is_some() {
            self.args.push(Some(Bytes::from(line)));
        } else if !self.reading_multi_line {
            return self.parse_header(&line);
        } else {
            self.parse_element_header(&line)?;
        }

        if self.finished() {
            Ok(Some(self.take_frame()))
        } else {
            Ok(None)
        }
    }

    fn parse_header(&mut self, line: &[u8]) -> ParseResult<Option<Reply>> {
        match line.first() {
            Some(&prefix::MULTI_BULK) => {
                let count: u32 = parse_number(&line[1..]).ok_or_else(|| ParseError::protocol(line))?;
                if count == 0 {
                    return Ok(Some(Reply::EmptyMultiBulk));
                }
                let count = count as usize;
                self.msg_type = prefix::MULTI_BULK;
                self.reading_multi_line = true;
                self.expected_args = count;
                self.args = Vec::with_capacity(count.min(MAX_PREALLOCATED_ARGS));
                Ok(None)
            }
            Some(&prefix::BULK_STRING) => match parse_bulk_len(line)? {
                None => Ok(Some(Reply::Bulk(None))),
                Some(len) => {
                    self.msg_type = prefix::BULK_STRING;
                    self.reading_multi_line = true;
                    self.expected_args = 1;
                    self.args = Vec::with_capacity(1);
                    self.bulk_len = Some(len);
                    Ok(None)
                }
            },
            Some(&prefix::STATUS) => Ok(Some(Reply::Status(lossy(&line[1..])))),
            Some(&prefix::ERROR) => Ok(Some(Reply::Error(lossy(&line[1..])))),
            Some(&prefix::INTEGER) => {
                let n: i64 = parse_number(&line[1..]).ok_or_else(|| ParseError::protocol(line))?;
                Ok(Some(Reply::Integer(n)))
            }
            _ => Err(ParseError::protocol(line)),
        }
    }

    /// Inside a multi bulk every element starts with its own `$<len>` line.
    fn parse_element_header(&mut self, line: &[u8]) -> ParseResult<()> {
        if line.first() != Some(&prefix::BULK_STRING) {
            return Err(ParseError::protocol(line));
        }
        match parse_bulk_len(line)? {
            None => self.args.push(None),
            Some(len) => self.bulk_len = Some(len),
        }
        Ok(())
    }

    fn take_frame(&mut self) -> Reply {
        let mut args = std::mem::take(&mut self.args);
        if self.msg_type == prefix::BULK_STRING {
            Reply::Bulk(args.pop().flatten())
        } else {
            Reply::MultiBulk(args)
        }
    }
}

/// Parses the length of a `$<len>` line. `Ok(None)` is the null bulk string.
fn parse_bulk_len(line: &[u8]) -> ParseResult<Option<usize>> {
    let len: i64 = parse_number(&line[1..]).ok_or_else(|| ParseError::protocol(line))?;
    match len {
        -1 => Ok(None),
        len if len < 0 || len as u64 > MAX_BULK_SIZE as u64 => Err(ParseError::protocol(line)),
        len => Ok(Some(len as usize)),
    }
}

fn parse_number<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Streaming frame decoder over an async byte source.
///
/// # Example
///
/// ```
/// use flashresp::protocol::{FrameReader, Reply};
///
/// # tokio_test::block_on(async {
/// let mut frames = FrameReader::new(&b"*1\r\n$4\r\nPING\r\n"[..]);
/// let frame = frames.next_payload().await.unwrap().unwrap();
/// assert_eq!(frame, Reply::multi_bulk(["PING"]));
/// # });
/// ```
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: BufReader<R>,
    state: ReadState,
    done: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            state: ReadState::default(),
            done: false,
        }
    }

    /// Returns the next payload, or `None` once the stream has terminated.
    ///
    /// A fatal error is always handed out once before `None`.
    pub async fn next_payload(&mut self) -> Option<Payload> {
        if self.done {
            return None;
        }

        loop {
            let result = match self.read_line().await {
                Ok(line) => self.state.consume(line),
                Err(err) => Err(err),
            };

            match result {
                Ok(None) => continue,
                Ok(Some(frame)) => {
                    trace!(frame = ?frame, "Decoded frame");
                    self.state = ReadState::default();
                    return Some(Ok(frame));
                }
                Err(err) => {
                    if err.is_fatal() {
                        self.done = true;
                    }
                    self.state = ReadState::default();
                    return Some(Err(err));
                }
            }
        }
    }

    /// Reads the next line with its CRLF stripped.
    async fn read_line(&mut self) -> ParseResult<Vec<u8>> {
        let mut line = match self.state.bulk_len {
            Some(len) => {
                let want = len + CRLF.len();
                let mut buf = Vec::with_capacity(want.min(MAX_PREALLOCATED_BODY));
                (&mut self.reader)
                    .take(want as u64)
                    .read_to_end(&mut buf)
                    .await?;
                if buf.len() < want {
                    return Err(ParseError::UnexpectedEof);
                }
                buf
            }
            None => {
                let mut buf = Vec::new();
                let n = (&mut self.reader)
                    .take(MAX_LINE_LEN as u64)
                    .read_until(b'\n', &mut buf)
                    .await?;
                if n == 0 {
                    return Err(if self.state.reading_multi_line {
                        ParseError::UnexpectedEof
                    } else {
                        ParseError::Eof
                    });
                }
                if buf.last() != Some(&b'\n') {
                    if buf.len() >= MAX_LINE_LEN {
                        return Err(ParseError::Protocol(format!(
                            "line longer than {} bytes",
                            MAX_LINE_LEN
                        )));
                    }
                    return Err(ParseError::UnexpectedEof);
                }
                buf
            }
        };

        if !line.ends_with(CRLF) {
            return Err(ParseError::protocol(&line));
        }
        line.truncate(line.len() - CRLF.len());
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::ReadBuf;

    /// Drains the reader, flattening errors to strings so sequences compare.
    async fn collect<R: AsyncRead + Unpin>(reader: R) -> Vec<Result<Reply, String>> {
        let mut frames = FrameReader::new(reader);
        let mut out = Vec::new();
        while let Some(payload) = frames.next_payload().await {
            out.push(payload.map_err(|e| e.to_string()));
        }
        out
    }

    fn one_byte_at_a_time(data: &[u8]) -> tokio_test::io::Mock {
        let mut builder = tokio_test::io::Builder::new();
        for byte in data {
            builder.read(std::slice::from_ref(byte));
        }
        builder.build()
    }

    fn eof() -> Result<Reply, String> {
        Err(ParseError::Eof.to_string())
    }

    #[tokio::test]
    async fn test_parse_multi_bulk() {
        let out = collect(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]).await;
        assert_eq!(out, vec![Ok(Reply::multi_bulk(["GET", "name"])), eof()]);
    }

    #[tokio::test]
    async fn test_parse_empty_multi_bulk() {
        let out = collect(&b"*0\r\n"[..]).await;
        assert_eq!(out, vec![Ok(Reply::EmptyMultiBulk), eof()]);
    }

    #[tokio::test]
    async fn test_parse_null_bulk_at_top_level() {
        let out = collect(&b"$-1\r\n"[..]).await;
        assert_eq!(out, vec![Ok(Reply::Bulk(None)), eof()]);
    }

    #[tokio::test]
    async fn test_parse_top_level_bulk() {
        let out = collect(&b"$5\r\nhello\r\n$0\r\n\r\n"[..]).await;
        assert_eq!(
            out,
            vec![Ok(Reply::bulk("hello")), Ok(Reply::bulk("")), eof()]
        );
    }

    #[tokio::test]
    async fn test_parse_single_line_replies() {
        let out = collect(&b"+OK\r\n-ERR boom\r\n:-42\r\n"[..]).await;
        assert_eq!(
            out,
            vec![
                Ok(Reply::status("OK")),
                Ok(Reply::error("ERR boom")),
                Ok(Reply::integer(-42)),
                eof(),
            ]
        );
    }

    #[tokio::test]
    async fn test_null_element_differs_from_empty_element() {
        let out = collect(&b"*3\r\n$-1\r\n$0\r\n\r\n$1\r\nx\r\n"[..]).await;
        assert_eq!(
            out[0],
            Ok(Reply::MultiBulk(vec![
                None,
                Some(Bytes::new()),
                Some(Bytes::from("x")),
            ]))
        );
    }

    #[tokio::test]
    async fn test_binary_payload_with_crlf_inside() {
        let out = collect(&b"*1\r\n$6\r\na\r\nb\r\n\r\n"[..]).await;
        assert_eq!(
            out[0],
            Ok(Reply::MultiBulk(vec![Some(Bytes::from(&b"a\r\nb\r\n"[..]))]))
        );
    }

    #[tokio::test]
    async fn test_malformed_header_recovers_on_next_frame() {
        let out = collect(&b"*abc\r\n*1\r\n$4\r\nPING\r\n"[..]).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Err("protocol error: '*abc'".to_string()));
        assert_eq!(out[1], Ok(Reply::multi_bulk(["PING"])));
        assert_eq!(out[2], eof());
    }

    #[tokio::test]
    async fn test_protocol_errors_are_recoverable() {
        let input: &[u8] = b"*-1\r\n$-2\r\n:abc\r\n@bad\r\n\r\n+OK\n*1\r\n+x\r\n:1\r\n";
        let mut frames = FrameReader::new(input);
        for _ in 0..7 {
            let err = frames.next_payload().await.unwrap().unwrap_err();
            assert!(!err.is_fatal(), "{err}");
        }
        assert_eq!(
            frames.next_payload().await.unwrap().unwrap(),
            Reply::integer(1)
        );
    }

    #[tokio::test]
    async fn test_bulk_without_terminator_is_protocol_error() {
        let out = collect(&b"$3\r\nfooXY+OK\r\n"[..]).await;
        assert_eq!(out[0], Err("protocol error: 'fooXY'".to_string()));
        assert_eq!(out[1], Ok(Reply::status("OK")));
    }

    #[tokio::test]
    async fn test_oversized_bulk_is_rejected() {
        let header = format!("${}\r\n", MAX_BULK_SIZE + 1);
        let mut frames = FrameReader::new(header.as_bytes());
        let err = frames.next_payload().await.unwrap().unwrap_err();
        assert!(matches!(err, ParseError::Protocol(_)));
    }

    /// Hands out `data`, then never becomes readable again. Records the
    /// largest read buffer it was offered.
    struct Stalled {
        data: Vec<u8>,
        largest_read: Arc<AtomicUsize>,
    }

    impl AsyncRead for Stalled {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.largest_read.fetch_max(buf.remaining(), Ordering::SeqCst);
            if self.data.is_empty() {
                return Poll::Pending;
            }
            let n = buf.remaining().min(self.data.len());
            let chunk: Vec<u8> = self.data.drain(..n).collect();
            buf.put_slice(&chunk);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_declared_bulk_length_is_not_reserved_up_front() {
        let largest_read = Arc::new(AtomicUsize::new(0));
        let header = format!("*1\r\n${}\r\nabc", MAX_BULK_SIZE);

        let mut pending = Vec::new();
        for _ in 0..8 {
            let mut frames = FrameReader::new(Stalled {
                data: header.clone().into_bytes(),
                largest_read: Arc::clone(&largest_read),
            });
            let waited =
                tokio::time::timeout(Duration::from_millis(20), frames.next_payload()).await;
            assert!(waited.is_err(), "body never arrived, parser must still wait");
            pending.push(frames);
        }

        assert!(
            largest_read.load(Ordering::SeqCst) <= 64 * 1024,
            "read buffer of {} bytes offered",
            largest_read.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_large_bulk_body_arrives_in_pieces() {
        let value = vec![b'v'; 100_000];
        let encoded = Reply::bulk(value.clone()).to_bytes();

        let mut builder = tokio_test::io::Builder::new();
        for chunk in encoded.chunks(4096) {
            builder.read(chunk);
        }
        let out = collect(builder.build()).await;
        assert_eq!(out, vec![Ok(Reply::bulk(value)), eof()]);
    }

    #[tokio::test]
    async fn test_overlong_line_is_protocol_error() {
        let mut input = vec![b'+'; MAX_LINE_LEN + 10];
        input.extend_from_slice(b"\r\n:5\r\n");

        let mut frames = FrameReader::new(&input[..]);
        let err = frames.next_payload().await.unwrap().unwrap_err();
        assert!(matches!(err, ParseError::Protocol(_)), "{err}");
        assert!(err.to_string().len() < 100);

        // The tail of the long line is read as a fresh frame.
        let tail = frames.next_payload().await.unwrap().unwrap();
        assert_eq!(tail, Reply::status("+".repeat(9)));
        assert_eq!(frames.next_payload().await.unwrap().unwrap(), Reply::integer(5));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_fatal() {
        let mut frames = FrameReader::new(&b"*2\r\n$3\r\nfoo\r\n"[..]);
        let err = frames.next_payload().await.unwrap().unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof));
        assert!(err.is_fatal());
        assert!(frames.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn test_truncated_bulk_body_is_fatal() {
        let out = collect(&b"*1\r\n$10\r\nabc"[..]).await;
        assert_eq!(out, vec![Err(ParseError::UnexpectedEof.to_string())]);
    }

    #[tokio::test]
    async fn test_partial_line_at_eof_is_fatal() {
        let out = collect(&b"+OK\r\n+PAR"[..]).await;
        assert_eq!(
            out,
            vec![
                Ok(Reply::status("OK")),
                Err(ParseError::UnexpectedEof.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_io_error_is_fatal() {
        let mock = tokio_test::io::Builder::new()
            .read(b"+OK\r\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut frames = FrameReader::new(mock);
        assert!(frames.next_payload().await.unwrap().is_ok());
        let err = frames.next_payload().await.unwrap().unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
        assert!(frames.next_payload().await.is_none());
    }

    #[tokio::test]
    async fn test_byte_at_a_time_matches_whole_input() {
        let input: &[u8] = b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nva\r\nl\r\n\
            *bad\r\n$-1\r\n*0\r\n+OK\r\n:7\r\n$4\r\nbulk\r\n*2\r\n$-1\r\n$0\r\n\r\n";

        let whole = collect(input).await;
        let fragmented = collect(one_byte_at_a_time(input)).await;

        assert_eq!(whole.len(), 9);
        assert_eq!(whole, fragmented);
    }

    #[tokio::test]
    async fn test_round_trip_multi_bulk() {
        for n in [0usize, 1, 1000] {
            let args: Vec<Bytes> = (0..n).map(|i| Bytes::from(format!("arg:{i}"))).collect();
            let encoded = Reply::multi_bulk(args.clone()).to_bytes();

            let decoded = collect(&encoded[..]).await;
            let decoded_args: Vec<Bytes> = match &decoded[0] {
                Ok(Reply::EmptyMultiBulk) => Vec::new(),
                Ok(Reply::MultiBulk(items)) => items.iter().flatten().cloned().collect(),
                other => panic!("unexpected payload: {other:?}"),
            };
            assert_eq!(decoded_args, args, "n = {n}");
        }
    }

    #[tokio::test]
    async fn test_pipelined_commands_keep_order() {
        let mut input = Vec::new();
        for i in 0..50 {
            Reply::multi_bulk([format!("cmd{i}")]).serialize_into(&mut input);
        }
        let out = collect(&input[..]).await;
        for (i, payload) in out.iter().take(50).enumerate() {
            assert_eq!(payload, &Ok(Reply::multi_bulk([format!("cmd{i}")])));
        }
    }
}
