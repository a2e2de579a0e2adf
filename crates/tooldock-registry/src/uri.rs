//! URI patterns with named placeholders, e.g. `docs://documents/{name}`.

use regex::Regex;
use std::collections::BTreeMap;
use tooldock_core::{ToolDockError, ToolDockResult};

/// Placeholder values extracted from a matched URI.
pub type UriParams = BTreeMap<String, String>;

/// A parsed resource URI pattern.
///
/// A placeholder matches one or more characters other than `/`.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    regex: Regex,
    params: Vec<String>,
    literal_len: usize,
    shape: String,
}

impl UriTemplate {
    /// Parse a pattern. A pattern without placeholders is a literal URI.
    pub fn parse(pattern: &str) -> ToolDockResult<Self> {
        if pattern.is_empty() {
            return Err(ToolDockError::Validation("empty URI pattern".into()));
        }

        let mut regex_src = String::from("^");
        let mut shape = String::new();
        let mut params: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut literal_len = 0;
        let mut chars = pattern.chars();
        let mut last_was_placeholder = false;

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if last_was_placeholder && literal.is_empty() {
                        return Err(ToolDockError::Validation(format!(
                            "adjacent placeholders in URI pattern '{pattern}'"
                        )));
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(ToolDockError::Validation(format!(
                            "unclosed placeholder in URI pattern '{pattern}'"
                        )));
                    }
                    if !is_identifier(&name) {
                        return Err(ToolDockError::Validation(format!(
                            "invalid placeholder name '{name}' in URI pattern '{pattern}'"
                        )));
                    }
                    if params.contains(&name) {
                        return Err(ToolDockError::Validation(format!(
                            "placeholder '{name}' repeated in URI pattern '{pattern}'"
                        )));
                    }

                    literal_len += literal.chars().count();
                    regex_src.push_str(&regex::escape(&literal));
                    shape.push_str(&literal);
                    literal.clear();

                    regex_src.push_str(&format!("(?P<{name}>[^/]+)"));
                    shape.push_str("{}");
                    params.push(name);
                    last_was_placeholder = true;
                }
                '}' => {
                    return Err(ToolDockError::Validation(format!(
                        "unbalanced '}}' in URI pattern '{pattern}'"
                    )));
                }
                other => {
                    literal.push(other);
                    last_was_placeholder = false;
                }
            }
        }

        literal_len += literal.chars().count();
        regex_src.push_str(&regex::escape(&literal));
        shape.push_str(&literal);
        regex_src.push('$');

        let regex = Regex::new(&regex_src)
            .map_err(|e| ToolDockError::Validation(format!("bad URI pattern '{pattern}': {e}")))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            params,
            literal_len,
            shape,
        })
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern has any placeholders.
    pub fn is_templated(&self) -> bool {
        !self.params.is_empty()
    }

    /// Placeholder names in pattern order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Number of literal characters; more literal text is more specific.
    pub fn specificity(&self) -> usize {
        self.literal_len
    }

    /// The pattern with placeholder names erased. Two templates with the
    /// same shape match exactly the same URIs.
    pub fn shape(&self) -> &str {
        &self.shape
    }

    /// Match `uri` and extract placeholder values.
    pub fn matches(&self, uri: &str) -> Option<UriParams> {
        let caps = self.regex.captures(uri)?;
        let mut values = UriParams::new();
        for name in &self.params {
            let value = caps.name(name)?;
            values.insert(name.clone(), value.as_str().to_string());
        }
        Some(values)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let t = UriTemplate::parse("docs://documents.txt").unwrap();
        assert!(!t.is_templated());
        assert!(t.matches("docs://documents.txt").is_some());
        assert!(t.matches("docs://documentsXtxt").is_none());
    }

    #[test]
    fn test_placeholder_extraction() {
        let t = UriTemplate::parse("docs://documents/{name}").unwrap();
        let params = t.matches("docs://documents/foo.txt").unwrap();
        assert_eq!(params.get("name").map(String::as_str), Some("foo.txt"));
    }

    #[test]
    fn test_placeholder_does_not_cross_slash() {
        let t = UriTemplate::parse("docs://documents/{name}").unwrap();
        assert!(t.matches("docs://documents/a/b.txt").is_none());
        assert!(t.matches("docs://documents/").is_none());
    }

    #[test]
    fn test_multiple_placeholders() {
        let t = UriTemplate::parse("repo://{owner}/{repo}/readme").unwrap();
        let params = t.matches("repo://rust-lang/cargo/readme").unwrap();
        assert_eq!(params["owner"], "rust-lang");
        assert_eq!(params["repo"], "cargo");
        assert_eq!(t.params(), ["owner".to_string(), "repo".to_string()]);
    }

    #[test]
    fn test_shape_erases_names() {
        let a = UriTemplate::parse("docs://{a}").unwrap();
        let b = UriTemplate::parse("docs://{b}").unwrap();
        assert_eq!(a.shape(), b.shape());
    }

    #[test]
    fn test_specificity() {
        let wide = UriTemplate::parse("docs://{path}").unwrap();
        let narrow = UriTemplate::parse("docs://documents/{name}").unwrap();
        assert!(narrow.specificity() > wide.specificity());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let t = UriTemplate::parse("file://notes.(v1)/{name}").unwrap();
        assert!(t.matches("file://notes.(v1)/a").is_some());
        assert!(t.matches("file://notesX(v1)/a").is_none());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(UriTemplate::parse("").is_err());
        assert!(UriTemplate::parse("docs://{name").is_err());
        assert!(UriTemplate::parse("docs://name}").is_err());
        assert!(UriTemplate::parse("docs://{}").is_err());
        assert!(UriTemplate::parse("docs://{1abc}").is_err());
        assert!(UriTemplate::parse("docs://{a}{b}").is_err());
        assert!(UriTemplate::parse("docs://{a}/{a}").is_err());
    }
}
