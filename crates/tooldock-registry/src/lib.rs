//! Tool, resource and prompt registration for tooldock servers.
//!
//! A [`Registry`] is filled once at start-up through explicit
//! [`Registry::register`] calls and then shared read-only with the
//! dispatcher. Handlers are trait objects ([`ToolHandler`],
//! [`ResourceHandler`], [`PromptHandler`]); [`tool_fn`] and friends adapt
//! async closures.

/// Descriptor types and their handler-free listing entries.
pub mod descriptor;
/// Handler traits, closure adapters and [`HandlerError`].
pub mod handler;
/// The registry itself.
pub mod registry;
/// Parameter schemas and argument binding.
pub mod schema;
/// URI templates for resources.
pub mod uri;

pub use descriptor::{
    Descriptor, PromptDescriptor, PromptInfo, ResourceDescriptor, ResourceInfo, ToolDescriptor,
    ToolInfo, DEFAULT_MIME_TYPE,
};
pub use handler::{
    prompt_fn, resource_fn, tool_fn, HandlerError, PromptHandler, ResourceContent,
    ResourceHandler, ToolHandler,
};
pub use registry::{Catalog, Registry, ResourceMatch};
pub use schema::{json_type_name, Arguments, InputSchema, ParamSpec, ParamType, SchemaViolation};
pub use uri::{UriParams, UriTemplate};
