//! File tools confined to a documents folder.
//!
//! Every path an LLM supplies is resolved against the folder root. Paths
//! that escape the root, directly or through a symlink, or that touch a
//! blocked location are refused with a tool error naming only the path the
//! caller gave, never the resolved host path.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tooldock_core::ToolDockResult;
use tooldock_registry::{
    Arguments, HandlerError, InputSchema, ParamSpec, ParamType, Registry, ToolDescriptor,
    ToolHandler,
};
use tracing::info;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

const BLOCKED_PATTERNS: &[&str] = &[
    "/etc/",
    "/proc/",
    "/sys/",
    ".ssh",
    ".aws",
    ".env",
    ".git/",
    "credentials",
    "secret",
    "id_rsa",
    "id_ed25519",
];

const BLOCKED_EXTENSIONS: &[&str] = &["sh", "bash", "exe", "bat", "cmd", "ps1"];

/// The folder file tools operate in.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// A sandbox rooted at `root`, made absolute against the working
    /// directory.
    pub fn new(root: impl AsRef<Path>) -> ToolDockResult<Self> {
        let root = std::path::absolute(root.as_ref())?;
        Ok(Self {
            root: normalize(&root),
        })
    }

    /// The directory every path is resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a caller-supplied path to a host path inside the root.
    pub async fn resolve(&self, user_path: &str) -> Result<PathBuf, HandlerError> {
        if user_path.trim().is_empty() {
            return Err(HandlerError::tool("empty path"));
        }

        let segments = format!("/{}/", user_path.replace('\\', "/").to_lowercase());
        if BLOCKED_PATTERNS.iter().any(|p| segments.contains(p)) {
            return Err(HandlerError::tool(format!(
                "access denied: '{user_path}' matches a blocked location"
            )));
        }

        let requested = Path::new(user_path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };
        let resolved = normalize(&joined);
        if !resolved.starts_with(&self.root) {
            return Err(outside(user_path));
        }

        self.check_links(&resolved, user_path).await?;
        Ok(resolved)
    }

    /// Symlinks inside the folder may still point elsewhere. The deepest part
    /// of `resolved` that exists, which is what a write would go through,
    /// must canonicalize to a path under the root. A dangling link counts as
    /// outside.
    async fn check_links(&self, resolved: &Path, user_path: &str) -> Result<(), HandlerError> {
        for ancestor in resolved.ancestors().take_while(|a| a.starts_with(&self.root)) {
            if tokio::fs::symlink_metadata(ancestor).await.is_err() {
                continue;
            }
            let real_root = tokio::fs::canonicalize(&self.root)
                .await
                .map_err(|e| io_failure("open", user_path, &e))?;
            return match tokio::fs::canonicalize(ancestor).await {
                Ok(real) if real.starts_with(&real_root) => Ok(()),
                _ => Err(outside(user_path)),
            };
        }
        Ok(())
    }
}

fn outside(user_path: &str) -> HandlerError {
    HandlerError::tool(format!("path '{user_path}' is outside the documents folder"))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn io_failure(action: &str, user_path: &str, e: &std::io::Error) -> HandlerError {
    match e.kind() {
        std::io::ErrorKind::NotFound => HandlerError::not_found(format!("'{user_path}' not found")),
        kind => HandlerError::tool(format!("failed to {action} '{user_path}': {kind}")),
    }
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

struct ReadFile {
    sandbox: Arc<Sandbox>,
}

#[async_trait]
impl ToolHandler for ReadFile {
    async fn call(&self, args: Arguments) -> Result<Value, HandlerError> {
        let user_path = args.require_str("path")?;
        let path = self.sandbox.resolve(user_path).await?;

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_failure("read", user_path, &e))?;
        if !metadata.is_file() {
            return Err(HandlerError::tool(format!("'{user_path}' is not a file")));
        }
        if metadata.len() > MAX_FILE_SIZE {
            return Err(HandlerError::tool(format!(
                "'{user_path}' is too large: {} bytes (max: {MAX_FILE_SIZE} bytes)",
                metadata.len()
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| io_failure("read", user_path, &e))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| HandlerError::tool(format!("'{user_path}' is not a UTF-8 text file")))?;

        info!(path = %user_path, size = metadata.len(), "Reading file");
        Ok(Value::String(content))
    }
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

struct WriteFile {
    sandbox: Arc<Sandbox>,
}

#[async_trait]
impl ToolHandler for WriteFile {
    async fn call(&self, args: Arguments) -> Result<Value, HandlerError> {
        let user_path = args.require_str("path")?;
        let content = args.require_str("content")?;
        let append = args.bool("append").unwrap_or(false);

        if content.len() as u64 > MAX_FILE_SIZE {
            return Err(HandlerError::tool(format!(
                "content too large: {} bytes (max: {MAX_FILE_SIZE} bytes)",
                content.len()
            )));
        }

        let path = self.sandbox.resolve(user_path).await?;
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if BLOCKED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                return Err(HandlerError::tool(format!(
                    "access denied: writing .{ext} files is not allowed"
                )));
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure("create folders for", user_path, &e))?;
        }

        let result = if append {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(mut file) => file.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(&path, content).await
        };
        result.map_err(|e| io_failure("write", user_path, &e))?;

        info!(path = %user_path, size = content.len(), append, "File written");
        Ok(json!({
            "path": user_path,
            "bytes_written": content.len(),
            "append": append,
        }))
    }
}

// ---------------------------------------------------------------------------
// list_files
// ---------------------------------------------------------------------------

struct ListFiles {
    sandbox: Arc<Sandbox>,
}

#[async_trait]
impl ToolHandler for ListFiles {
    async fn call(&self, args: Arguments) -> Result<Value, HandlerError> {
        let user_path = args.str("path").unwrap_or(".");
        let dir = self.sandbox.resolve(user_path).await?;

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| io_failure("list", user_path, &e))?;
        let mut listing = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_failure("list", user_path, &e))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| io_failure("list", user_path, &e))?;
            listing.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "kind": if metadata.is_dir() { "dir" } else { "file" },
                "size": metadata.len(),
            }));
        }
        listing.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(Value::Array(listing))
    }
}

/// Register `read_file`, `write_file` and `list_files` rooted at `root`.
pub fn register(registry: &mut Registry, root: &Path) -> ToolDockResult<()> {
    let sandbox = Arc::new(Sandbox::new(root)?);
    std::fs::create_dir_all(sandbox.root())?;
    info!(root = %sandbox.root().display(), "File tools enabled");

    registry.register(
        ToolDescriptor::new(
            "read_file",
            "Read a UTF-8 text file from the documents folder",
            InputSchema::new().param(
                ParamSpec::required("path", ParamType::String)
                    .describe("Path relative to the documents folder"),
            ),
            Arc::new(ReadFile {
                sandbox: sandbox.clone(),
            }),
        )
        .returns(ParamType::String),
    )?;

    registry.register(
        ToolDescriptor::new(
            "write_file",
            "Write a text file in the documents folder, creating folders as needed",
            InputSchema::new()
                .param(
                    ParamSpec::required("path", ParamType::String)
                        .describe("Path relative to the documents folder"),
                )
                .param(ParamSpec::required("content", ParamType::String))
                .param(
                    ParamSpec::optional("append", ParamType::Boolean)
                        .with_default(json!(false))
                        .describe("Append instead of overwriting"),
                ),
            Arc::new(WriteFile {
                sandbox: sandbox.clone(),
            }),
        )
        .returns(ParamType::Object),
    )?;

    registry.register(
        ToolDescriptor::new(
            "list_files",
            "List the entries of a folder inside the documents folder",
            InputSchema::new().param(
                ParamSpec::optional("path", ParamType::String)
                    .with_default(json!("."))
                    .describe("Folder relative to the documents folder"),
            ),
            Arc::new(ListFiles { sandbox }),
        )
        .returns(ParamType::Array),
    )?;

    Ok(())
}
