//! Core types and error definitions for tooldock.
//!
//! This crate holds what both sides of the wire agree on: the request and
//! response envelopes, the error taxonomy, and the tool-call types the
//! client proxy exchanges with an LLM conversation loop.
//!
//! # Main types
//!
//! - [`Request`] / [`Response`] — the envelopes, one JSON object per frame.
//! - [`ErrorKind`] / [`ErrorPayload`] — the error taxonomy as sent on the wire.
//! - [`ToolDockError`] — unified error enum for all tooldock crates.
//! - [`ToolDockResult`] — convenience alias for `Result<T, ToolDockError>`.
//! - [`ToolCall`] / [`ToolResult`] — LLM-facing call and result messages.

/// Error taxonomy.
pub mod error;
/// Wire envelopes and frame decoding.
pub mod protocol;
/// LLM-facing tool call and result types.
pub mod tool;

pub use error::{ErrorKind, ErrorPayload, ToolDockError, ToolDockResult, INTERNAL_ERROR_MESSAGE};
pub use protocol::{decode_request, FrameError, Request, RequestKind, Response, Status};
pub use tool::{ToolCall, ToolResult};
