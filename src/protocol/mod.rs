//! RESP Protocol Implementation
//!
//! This module provides the wire format used between clients and the server.
//!
//! ## Modules
//!
//! - `reply`: Defines the `Reply` enum and its serialization
//! - `parser`: Incremental, stream-driven frame parser
//!
//! ## Example
//!
//! ```ignore
//! use flashresp::protocol::{FrameReader, Reply};
//!
//! // Decoding a request from any AsyncRead
//! let mut frames = FrameReader::new(socket);
//! while let Some(payload) = frames.next_payload().await {
//!     let frame = payload?;
//!     // ...
//! }
//!
//! // Encoding a reply
//! let bytes = Reply::bulk("hello").to_bytes();
//! ```

pub mod parser;
pub mod reply;

// Re-export commonly used types for convenience
pub use parser::{FrameReader, ParseError, ParseResult, Payload, MAX_BULK_SIZE, MAX_LINE_LEN};
pub use reply::{is_error_reply, Reply, CRLF};
