use std::collections::HashSet;
use tooldock_registry::ToolInfo;

/// Progressive tool disclosure: narrow the discovered tool list before
/// showing it to the LLM, so each turn carries only the relevant schemas.
pub struct ToolDiscovery;

impl ToolDiscovery {
    /// Keep only tools whose (possibly namespaced) name is in `allowed`.
    pub fn filter_by_allowed(tools: &[ToolInfo], allowed: &[String]) -> Vec<ToolInfo> {
        let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        tools
            .iter()
            .filter(|t| allowed.contains(t.name.as_str()))
            .cloned()
            .collect()
    }

    /// Keep tools whose name or description mentions any keyword
    /// (case-insensitive). No keywords keeps everything.
    pub fn filter_by_keywords(tools: &[ToolInfo], keywords: &[&str]) -> Vec<ToolInfo> {
        if keywords.is_empty() {
            return tools.to_vec();
        }
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        tools
            .iter()
            .filter(|t| {
                let name = t.name.to_lowercase();
                let description = t.description.to_lowercase();
                keywords
                    .iter()
                    .any(|kw| name.contains(kw) || description.contains(kw))
            })
            .cloned()
            .collect()
    }
}
