//! Serving side of tooldock: the [`Dispatcher`] plus the stdio and HTTP
//! surfaces that feed it.

/// Request dispatch against a [`tooldock_registry::Registry`].
pub mod dispatcher;
/// HTTP endpoint built on axum.
pub mod http;
/// Newline-delimited JSON over a byte stream.
pub mod stdio;

pub use dispatcher::Dispatcher;
pub use http::{HttpServer, HttpState, DEFAULT_RPC_PATH};
pub use stdio::{serve_stdio, ServeMode};
