//! Client side of tooldock: transports to remote servers and the
//! [`ClientProxy`] that presents their tools to an LLM.

/// Remote server and client behaviour configuration.
pub mod config;
/// Tool list filtering for progressive disclosure.
pub mod discovery;
/// OpenAI and Anthropic function-calling shapes.
pub mod llm;
/// Discovery, namespacing, routing, call log.
pub mod proxy;
/// Stdio and HTTP transports.
pub mod transport;

pub use config::{ClientConfig, Endpoint, ServerConfig};
pub use discovery::ToolDiscovery;
pub use llm::LlmFormat;
pub use proxy::{CallLogEntry, ClientProxy, ServerMetrics, ServerStatus};
pub use transport::{HttpTransport, StdioTransport, Transport};
