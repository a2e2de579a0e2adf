use crate::descriptor::{
    Descriptor, PromptDescriptor, PromptInfo, ResourceDescriptor, ResourceInfo, ToolDescriptor,
    ToolInfo,
};
use crate::uri::UriParams;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tooldock_core::{ToolDockError, ToolDockResult};
use tracing::info;

/// A resource descriptor together with the placeholder values the URI bound.
#[derive(Debug)]
pub struct ResourceMatch<'a> {
    /// The matching resource.
    pub descriptor: &'a ResourceDescriptor,
    /// Values bound by the template.
    pub params: UriParams,
}

/// Everything a registry exposes, as shown to an LLM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// All tools.
    pub tools: Vec<ToolInfo>,
    /// All resources.
    pub resources: Vec<ResourceInfo>,
    /// All prompts.
    pub prompts: Vec<PromptInfo>,
}

/// The process-lifetime set of tools, resources and prompts.
///
/// Populated during start-up, then shared read-only (usually behind an
/// `Arc`) by the dispatcher, so lookups need no locking.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, ToolDescriptor>,
    /// Literal resource URIs.
    resources: HashMap<String, ResourceDescriptor>,
    /// Templated resources, most specific first.
    templates: Vec<ResourceDescriptor>,
    template_shapes: HashSet<String>,
    prompts: HashMap<String, PromptDescriptor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register any descriptor. Names and URI patterns must be unique;
    /// a duplicate is rejected and the existing registration is kept.
    pub fn register(&mut self, descriptor: impl Into<Descriptor>) -> ToolDockResult<()> {
        match descriptor.into() {
            Descriptor::Tool(d) => self.register_tool(d),
            Descriptor::Resource(d) => self.register_resource(d),
            Descriptor::Prompt(d) => self.register_prompt(d),
        }
    }

    /// Register a tool. Fails on a duplicate name.
    pub fn register_tool(&mut self, descriptor: ToolDescriptor) -> ToolDockResult<()> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(ToolDockError::DuplicateName(descriptor.name));
        }
        info!(tool = %descriptor.name, "Registered tool");
        self.tools.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Register a resource. Fails on a duplicate URI pattern.
    pub fn register_resource(&mut self, descriptor: ResourceDescriptor) -> ToolDockResult<()> {
        let pattern = descriptor.uri_pattern().to_string();

        if descriptor.template.is_templated() {
            let shape = descriptor.template.shape().to_string();
            if !self.template_shapes.insert(shape) {
                return Err(ToolDockError::DuplicateName(pattern));
            }
            // Stable insert keeps registration order among equally specific templates.
            let specificity = descriptor.template.specificity();
            let pos = self
                .templates
                .iter()
                .position(|t| t.template.specificity() < specificity)
                .unwrap_or(self.templates.len());
            self.templates.insert(pos, descriptor);
        } else {
            if self.resources.contains_key(&pattern) {
                return Err(ToolDockError::DuplicateName(pattern));
            }
            self.resources.insert(pattern.clone(), descriptor);
        }

        info!(resource = %pattern, "Registered resource");
        Ok(())
    }

    /// Register a prompt. Fails on a duplicate name.
    pub fn register_prompt(&mut self, descriptor: PromptDescriptor) -> ToolDockResult<()> {
        if self.prompts.contains_key(&descriptor.name) {
            return Err(ToolDockError::DuplicateName(descriptor.name));
        }
        info!(prompt = %descriptor.name, "Registered prompt");
        self.prompts.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a tool by exact name.
    pub fn resolve_tool(&self, name: &str) -> ToolDockResult<&ToolDescriptor> {
        self.tools
            .get(name)
            .ok_or_else(|| ToolDockError::NotFound(format!("unknown tool '{name}'")))
    }

    /// Resolve a concrete URI. A literal registration wins over any
    /// template; among templates the most specific one wins.
    pub fn resolve_resource(&self, uri: &str) -> ToolDockResult<ResourceMatch<'_>> {
        if let Some(descriptor) = self.resources.get(uri) {
            return Ok(ResourceMatch {
                descriptor,
                params: UriParams::new(),
            });
        }

        self.templates
            .iter()
            .find_map(|descriptor| {
                descriptor
                    .template
                    .matches(uri)
                    .map(|params| ResourceMatch { descriptor, params })
            })
            .ok_or_else(|| ToolDockError::NotFound(format!("unknown resource '{uri}'")))
    }

    /// Look up a prompt by exact name.
    pub fn resolve_prompt(&self, name: &str) -> ToolDockResult<&PromptDescriptor> {
        self.prompts
            .get(name)
            .ok_or_else(|| ToolDockError::NotFound(format!("unknown prompt '{name}'")))
    }

    /// Tool listing, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self.tools.values().map(ToolDescriptor::info).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Literal resources sorted by URI, then templates in resolution order.
    pub fn list_resources(&self) -> Vec<ResourceInfo> {
        let mut literals: Vec<ResourceInfo> =
            self.resources.values().map(ResourceDescriptor::info).collect();
        literals.sort_by(|a, b| a.uri.cmp(&b.uri));
        literals.extend(self.templates.iter().map(ResourceDescriptor::info));
        literals
    }

    /// Prompt listings, in registration order.
    pub fn list_prompts(&self) -> Vec<PromptInfo> {
        let mut prompts: Vec<PromptInfo> =
            self.prompts.values().map(PromptDescriptor::info).collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }

    /// Everything at once.
    pub fn list(&self) -> Catalog {
        Catalog {
            tools: self.list_tools(),
            resources: self.list_resources(),
            prompts: self.list_prompts(),
        }
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Number of registered resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len() + self.templates.len()
    }

    /// Number of registered prompts.
    pub fn prompt_count(&self) -> usize {
        self.prompts.len()
    }
}
