use crate::handler::{PromptHandler, ResourceHandler, ToolHandler};
use crate::schema::{InputSchema, ParamType};
use crate::uri::UriTemplate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tooldock_core::ToolDockResult;

/// Default MIME type of a resource.
pub const DEFAULT_MIME_TYPE: &str = "text/plain";

/// A registered tool: metadata plus the handler that executes it.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Shown to the LLM.
    pub description: String,
    /// Declared parameters.
    pub input_schema: InputSchema,
    /// Declared result type. When set, results of another type are rejected.
    pub output: Option<ParamType>,
    /// Invoked with validated arguments.
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    /// A tool with no declared output type.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            output: None,
            handler,
        }
    }

    /// Declare the result type the handler promises to return.
    pub fn returns(mut self, output: ParamType) -> Self {
        self.output = Some(output);
        self
    }

    /// The listing entry for this tool, without the handler.
    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.to_json_schema(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

/// A registered resource, addressed by a literal URI or a URI template.
#[derive(Clone)]
pub struct ResourceDescriptor {
    /// URI or URI template the resource answers to.
    pub template: UriTemplate,
    /// Display name.
    pub name: String,
    /// Shown to clients.
    pub description: String,
    /// Advisory content type.
    pub mime_type: String,
    /// Reads the content for a matched URI.
    pub handler: Arc<dyn ResourceHandler>,
}

impl ResourceDescriptor {
    /// Fails if `uri_pattern` is not a valid pattern.
    pub fn new(
        uri_pattern: &str,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ResourceHandler>,
    ) -> ToolDockResult<Self> {
        Ok(Self {
            template: UriTemplate::parse(uri_pattern)?,
            name: name.into(),
            description: description.into(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            handler,
        })
    }

    /// Override the default `text/plain` MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// The template as registered.
    pub fn uri_pattern(&self) -> &str {
        self.template.as_str()
    }

    /// Listing entry for this resource.
    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            uri: self.template.as_str().to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            templated: self.template.is_templated(),
        }
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("uri_pattern", &self.template.as_str())
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

/// A registered prompt template.
#[derive(Clone)]
pub struct PromptDescriptor {
    /// Unique prompt name.
    pub name: String,
    /// Shown to clients.
    pub description: String,
    /// Declared arguments.
    pub arguments: InputSchema,
    /// Renders the prompt text.
    pub handler: Arc<dyn PromptHandler>,
}

impl PromptDescriptor {
    /// A prompt with the given arguments.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        arguments: InputSchema,
        handler: Arc<dyn PromptHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            arguments,
            handler,
        }
    }

    /// Listing entry for this prompt.
    pub fn info(&self) -> PromptInfo {
        PromptInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self.arguments.to_json_schema(),
        }
    }
}

impl fmt::Debug for PromptDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Any registrable descriptor.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// A tool.
    Tool(ToolDescriptor),
    /// A resource.
    Resource(ResourceDescriptor),
    /// A prompt.
    Prompt(PromptDescriptor),
}

impl From<ToolDescriptor> for Descriptor {
    fn from(d: ToolDescriptor) -> Self {
        Descriptor::Tool(d)
    }
}

impl From<ResourceDescriptor> for Descriptor {
    fn from(d: ResourceDescriptor) -> Self {
        Descriptor::Resource(d)
    }
}

impl From<PromptDescriptor> for Descriptor {
    fn from(d: PromptDescriptor) -> Self {
        Descriptor::Prompt(d)
    }
}

/// What `list_tools` returns for one tool. Never carries the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(default)]
    pub description: String,
    /// JSON-Schema object describing the accepted arguments.
    #[serde(default = "empty_object_schema")]
    pub input_schema: serde_json::Value,
}

/// What `list_resources` returns for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Literal URI or URI template.
    pub uri: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// MIME type of the content.
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// True when the URI has `{param}` segments.
    #[serde(default)]
    pub templated: bool,
}

/// What `list_prompts` returns for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptInfo {
    /// Prompt name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// JSON schema of the arguments.
    #[serde(default = "empty_object_schema")]
    pub arguments: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}
