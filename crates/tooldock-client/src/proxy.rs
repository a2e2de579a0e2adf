use crate::config::{validate_server_name, ClientConfig, Endpoint, ServerConfig};
use crate::llm::LlmFormat;
use crate::transport::{HttpTransport, StdioTransport, Transport};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tooldock_core::{
    ErrorKind, ErrorPayload, Request, ToolCall, ToolDockError, ToolDockResult, ToolResult,
};
use tooldock_registry::{json_type_name, Catalog, PromptInfo, ResourceInfo, ToolInfo, UriTemplate};
use tracing::{debug, info, warn};

/// One proxied tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLogEntry {
    /// Id from the originating [`ToolCall`].
    pub call_id: String,
    /// Server that handled the call.
    pub server: String,
    /// Unqualified tool name.
    pub tool: String,
    /// When the call started.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Whether the call succeeded.
    pub success: bool,
    /// Error kind of a failed call.
    pub error_kind: Option<ErrorKind>,
}

/// Per-server call counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerMetrics {
    /// All calls routed to the server.
    pub total_calls: u64,
    /// Calls that succeeded.
    pub successful_calls: u64,
    /// Calls that failed, timeouts included.
    pub failed_calls: u64,
    /// Calls that hit the client timeout.
    pub timed_out_calls: u64,
    /// Sum of call durations.
    pub total_duration_ms: u64,
}

/// Connection state of one server, for display.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    /// Server name.
    pub name: String,
    /// False once the channel has failed.
    pub connected: bool,
    /// Tools discovered.
    pub tool_count: usize,
    /// Resources discovered.
    pub resource_count: usize,
    /// Prompts discovered.
    pub prompt_count: usize,
    /// When the current session was established.
    pub connected_at: DateTime<Utc>,
    /// Reconnections so far.
    pub reconnect_count: usize,
}

/// What discovery learned about one server.
struct Discovered {
    catalog: Catalog,
    templates: Vec<UriTemplate>,
}

struct ServerSlot {
    name: String,
    /// `None` for transports attached directly; those cannot be respawned.
    config: Option<ServerConfig>,
    transport: Arc<dyn Transport>,
    discovered: Discovered,
    stale: bool,
    connected_at: DateTime<Utc>,
    reconnect_count: usize,
}

impl ServerSlot {
    fn is_live(&self) -> bool {
        !self.stale && !self.transport.is_closed()
    }
}

/// The LLM-facing side: discovers what connected servers offer and relays
/// the LLM's chosen calls to them.
///
/// With more than one server connected, tool and prompt names are presented
/// as `server.name` and routed by that prefix.
pub struct ClientProxy {
    config: ClientConfig,
    servers: RwLock<Vec<ServerSlot>>,
    next_id: AtomicU64,
    log: RwLock<VecDeque<CallLogEntry>>,
    metrics: RwLock<HashMap<String, ServerMetrics>>,
}

impl ClientProxy {
    /// A proxy with no servers.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            servers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            log: RwLock::new(VecDeque::new()),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------
    // Connection management
    // -----------------------------------------------------------------

    /// Open a transport to `server` and run discovery on it. Any failure is
    /// a setup failure for that server.
    pub async fn connect(&self, server: ServerConfig) -> ToolDockResult<()> {
        let name = server.name.clone();
        let result = async {
            self.config.validate()?;
            self.ensure_unique(&name).await?;
            let transport = open_transport(&server).await?;
            self.install(&name, Some(server), transport).await
        }
        .await;
        result.map_err(|e| setup_failure(&name, e))
    }

    /// Connect every server in order, stopping at the first failure.
    pub async fn connect_all(&self, servers: &[ServerConfig]) -> ToolDockResult<()> {
        for server in servers {
            self.connect(server.clone()).await?;
        }
        Ok(())
    }

    /// Use an already-open transport. It is not respawned if it fails.
    pub async fn attach(&self, name: &str, transport: Arc<dyn Transport>) -> ToolDockResult<()> {
        let result = async {
            self.config.validate()?;
            validate_server_name(name)?;
            self.ensure_unique(name).await?;
            self.install(name, None, transport).await
        }
        .await;
        result.map_err(|e| setup_failure(name, e))
    }

    async fn install(
        &self,
        name: &str,
        config: Option<ServerConfig>,
        transport: Arc<dyn Transport>,
    ) -> ToolDockResult<()> {
        let discovered = match self.discover_on(name, transport.as_ref()).await {
            Ok(d) => d,
            Err(e) => {
                transport.close().await;
                return Err(e);
            }
        };
        info!(
            server = %name,
            tools = discovered.catalog.tools.len(),
            resources = discovered.catalog.resources.len(),
            prompts = discovered.catalog.prompts.len(),
            "Server connected"
        );

        self.servers.write().await.push(ServerSlot {
            name: name.to_string(),
            config,
            transport,
            discovered,
            stale: false,
            connected_at: Utc::now(),
            reconnect_count: 0,
        });
        Ok(())
    }

    async fn ensure_unique(&self, name: &str) -> ToolDockResult<()> {
        if self.servers.read().await.iter().any(|s| s.name == name) {
            return Err(ToolDockError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Re-run discovery on every connected server.
    pub async fn discover(&self) -> ToolDockResult<()> {
        let targets: Vec<(String, Arc<dyn Transport>)> = {
            let servers = self.servers.read().await;
            servers
                .iter()
                .map(|s| (s.name.clone(), s.transport.clone()))
                .collect()
        };

        for (name, transport) in targets {
            let discovered = self
                .discover_on(&name, transport.as_ref())
                .await
                .map_err(|e| setup_failure(&name, e))?;
            let mut servers = self.servers.write().await;
            if let Some(slot) = servers.iter_mut().find(|s| s.name == name) {
                slot.discovered = discovered;
            }
        }
        Ok(())
    }

    async fn discover_on(&self, name: &str, transport: &dyn Transport) -> ToolDockResult<Discovered> {
        let info = self
            .exchange(name, transport, Request::initialize(self.next_request_id()))
            .await?;
        debug!(server = %name, remote = %info["name"], version = %info["version"], "Initialized");

        let tools: Vec<ToolInfo> = decode_listing(
            name,
            self.exchange(name, transport, Request::list_tools(self.next_request_id()))
                .await?,
        )?;
        let resources: Vec<ResourceInfo> = decode_listing(
            name,
            self.exchange(name, transport, Request::list_resources(self.next_request_id()))
                .await?,
        )?;
        let prompts: Vec<PromptInfo> = decode_listing(
            name,
            self.exchange(name, transport, Request::list_prompts(self.next_request_id()))
                .await?,
        )?;

        let templates = resources
            .iter()
            .filter(|r| r.templated)
            .filter_map(|r| match UriTemplate::parse(&r.uri) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!(server = %name, uri = %r.uri, error = %e, "Ignoring unparseable resource template");
                    None
                }
            })
            .collect();

        Ok(Discovered {
            catalog: Catalog {
                tools,
                resources,
                prompts,
            },
            templates,
        })
    }

    /// A live transport for `server`, respawning it first if it was torn
    /// down and auto-reconnect is on.
    async fn live_transport(&self, server: &str) -> ToolDockResult<Arc<dyn Transport>> {
        {
            let servers = self.servers.read().await;
            let slot = find(&servers, server)?;
            if slot.is_live() {
                return Ok(slot.transport.clone());
            }
            if !self.config.auto_reconnect || slot.config.is_none() {
                return Err(ToolDockError::Transport(format!(
                    "server '{server}' is disconnected"
                )));
            }
        }
        self.reconnect(server).await
    }

    async fn reconnect(&self, server: &str) -> ToolDockResult<Arc<dyn Transport>> {
        let config = {
            let servers = self.servers.read().await;
            find(&servers, server)?.config.clone()
        }
        .ok_or_else(|| ToolDockError::Transport(format!("server '{server}' cannot be respawned")))?;

        info!(server = %server, "Reconnecting");
        let transport = open_transport(&config).await?;
        let discovered = match self.discover_on(server, transport.as_ref()).await {
            Ok(d) => d,
            Err(e) => {
                transport.close().await;
                warn!(server = %server, error = %e, "Reconnect failed");
                return Err(e);
            }
        };

        let mut servers = self.servers.write().await;
        let slot = servers
            .iter_mut()
            .find(|s| s.name == server)
            .ok_or_else(|| ToolDockError::NotFound(format!("unknown server '{server}'")))?;
        if slot.is_live() {
            // Someone else reconnected while we were discovering.
            transport.close().await;
            return Ok(slot.transport.clone());
        }
        slot.transport = transport.clone();
        slot.discovered = discovered;
        slot.stale = false;
        slot.connected_at = Utc::now();
        slot.reconnect_count += 1;
        info!(server = %server, reconnects = slot.reconnect_count, "Server reconnected");
        Ok(transport)
    }

    async fn mark_stale(&self, server: &str) {
        let mut servers = self.servers.write().await;
        if let Some(slot) = servers.iter_mut().find(|s| s.name == server) {
            if !slot.stale {
                warn!(server = %server, "Server marked disconnected");
            }
            slot.stale = true;
        }
    }

    /// Close every transport.
    pub async fn close(&self) {
        let servers = self.servers.read().await;
        for slot in servers.iter() {
            slot.transport.close().await;
        }
    }

    // -----------------------------------------------------------------
    // Discovery results
    // -----------------------------------------------------------------

    /// Merged tool list, namespaced when more than one server is connected.
    pub async fn tools(&self) -> Vec<ToolInfo> {
        let servers = self.servers.read().await;
        let namespaced = servers.len() > 1;
        servers
            .iter()
            .flat_map(|s| {
                s.discovered.catalog.tools.iter().map(move |t| ToolInfo {
                    name: qualify(namespaced, &s.name, &t.name),
                    ..t.clone()
                })
            })
            .collect()
    }

    /// Merged resource list. URIs are not prefixed.
    pub async fn resources(&self) -> Vec<ResourceInfo> {
        let servers = self.servers.read().await;
        servers
            .iter()
            .flat_map(|s| s.discovered.catalog.resources.iter().cloned())
            .collect()
    }

    /// Prompts from every server, namespaced like tools.
    pub async fn prompts(&self) -> Vec<PromptInfo> {
        let servers = self.servers.read().await;
        let namespaced = servers.len() > 1;
        servers
            .iter()
            .flat_map(|s| {
                s.discovered.catalog.prompts.iter().map(move |p| PromptInfo {
                    name: qualify(namespaced, &s.name, &p.name),
                    ..p.clone()
                })
            })
            .collect()
    }

    /// Connected server names, sorted.
    pub async fn server_names(&self) -> Vec<String> {
        let servers = self.servers.read().await;
        servers.iter().map(|s| s.name.clone()).collect()
    }

    /// Connection state of every server.
    pub async fn status(&self) -> Vec<ServerStatus> {
        let servers = self.servers.read().await;
        servers
            .iter()
            .map(|s| ServerStatus {
                name: s.name.clone(),
                connected: s.is_live(),
                tool_count: s.discovered.catalog.tools.len(),
                resource_count: s.discovered.catalog.resources.len(),
                prompt_count: s.discovered.catalog.prompts.len(),
                connected_at: s.connected_at,
                reconnect_count: s.reconnect_count,
            })
            .collect()
    }

    // -----------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------

    /// Relay an LLM-chosen call and produce the tool result to hand back.
    /// Failures become an error result, never an `Err`.
    pub async fn invoke(&self, call: ToolCall) -> ToolResult {
        let arguments = match call.arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return ToolResult::failure(
                    call.id,
                    &ErrorPayload::validation(format!(
                        "arguments must be a JSON object, got {}",
                        json_type_name(&other)
                    )),
                )
            }
        };

        match self.call_tool(&call.name, arguments).await {
            Ok(Value::String(text)) => ToolResult::success(call.id, text),
            Ok(value) => ToolResult::success(call.id, value.to_string()),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult::failure(call.id, &e.to_payload())
            }
        }
    }

    /// Run every tool call requested in an LLM chat reply, in order, and
    /// return the tool-result messages to append to the conversation, in
    /// the same API's shape.
    pub async fn respond(&self, format: LlmFormat, reply: &Value) -> Vec<Value> {
        let calls = format.tool_calls(reply);
        debug!(calls = calls.len(), ?format, "Answering tool calls");
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.invoke(call).await;
            results.push(format.tool_result(&result));
        }
        results
    }

    /// Call a tool by its presented name and return the raw result value.
    pub async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> ToolDockResult<Value> {
        let (server, tool) = self.route(name, |c| &c.tools, |t: &ToolInfo| &t.name).await?;
        let request = Request::call_tool(self.next_request_id(), tool.clone(), arguments);
        let call_id = request.id.clone();

        let start = Instant::now();
        let result = self.send_to(&server, request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.record(CallLogEntry {
            call_id,
            server: server.clone(),
            tool: tool.clone(),
            timestamp: Utc::now(),
            duration_ms,
            success: result.is_ok(),
            error_kind: result.as_ref().err().map(ToolDockError::kind),
        })
        .await;
        debug!(server = %server, tool = %tool, duration_ms, ok = result.is_ok(), "Tool call complete");
        result
    }

    /// Read a resource. With several servers the URI is routed to the one
    /// that advertises it: a literal match first, then the most specific
    /// template.
    pub async fn read_resource(&self, uri: &str) -> ToolDockResult<Value> {
        let server = self.route_resource(uri).await?;
        self.send_to(&server, Request::read_resource(self.next_request_id(), uri))
            .await
    }

    /// Render a prompt by its presented name.
    pub async fn get_prompt(&self, name: &str, arguments: Map<String, Value>) -> ToolDockResult<String> {
        let (server, prompt) = self.route(name, |c| &c.prompts, |p: &PromptInfo| &p.name).await?;
        let value = self
            .send_to(&server, Request::get_prompt(self.next_request_id(), prompt, arguments))
            .await?;
        match value {
            Value::String(text) => Ok(text),
            other => Err(ToolDockError::Transport(format!(
                "server '{server}' returned a {} for a prompt",
                json_type_name(&other)
            ))),
        }
    }

    /// Round-trip a `list_tools` to `server`.
    pub async fn health_check(&self, server: &str) -> ToolDockResult<()> {
        self.send_to(server, Request::list_tools(self.next_request_id()))
            .await
            .map(|_| ())
    }

    async fn send_to(&self, server: &str, request: Request) -> ToolDockResult<Value> {
        let transport = self.live_transport(server).await?;
        let result = self.exchange(server, transport.as_ref(), request).await;
        if result.is_err() && transport.is_closed() {
            self.mark_stale(server).await;
        }
        result
    }

    /// One request/response with the configured deadline. On timeout the
    /// transport is torn down rather than left to finish unobserved.
    async fn exchange(
        &self,
        server: &str,
        transport: &dyn Transport,
        request: Request,
    ) -> ToolDockResult<Value> {
        let deadline = self.config.timeout();
        let id = request.id.clone();
        match tokio::time::timeout(deadline, transport.send(request)).await {
            Err(_) => {
                warn!(server = %server, id = %id, "Request timed out, closing transport");
                transport.close().await;
                Err(ToolDockError::Timeout(format!(
                    "server '{server}' did not respond within {}s",
                    deadline.as_secs_f64()
                )))
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok(response)) => response.into_result().map_err(ToolDockError::Remote),
        }
    }

    /// Split a presented name into (server, local name).
    async fn route<T>(
        &self,
        name: &str,
        items: impl Fn(&Catalog) -> &Vec<T>,
        item_name: impl Fn(&T) -> &String,
    ) -> ToolDockResult<(String, String)> {
        let servers = self.servers.read().await;
        match servers.as_slice() {
            [] => Err(ToolDockError::NotFound("no servers connected".into())),
            [only] => {
                let known = items(&only.discovered.catalog)
                    .iter()
                    .any(|i| item_name(i) == name);
                let local = if known {
                    name
                } else {
                    name.strip_prefix(&format!("{}.", only.name)).unwrap_or(name)
                };
                Ok((only.name.clone(), local.to_string()))
            }
            many => {
                let (server, local) = name.split_once('.').ok_or_else(|| {
                    ToolDockError::NotFound(format!(
                        "'{name}' is not qualified with a server name"
                    ))
                })?;
                if many.iter().any(|s| s.name == server) {
                    Ok((server.to_string(), local.to_string()))
                } else {
                    Err(ToolDockError::NotFound(format!("unknown server '{server}'")))
                }
            }
        }
    }

    async fn route_resource(&self, uri: &str) -> ToolDockResult<String> {
        let servers = self.servers.read().await;
        if let [only] = servers.as_slice() {
            return Ok(only.name.clone());
        }

        if let Some(slot) = servers.iter().find(|s| {
            s.discovered
                .catalog
                .resources
                .iter()
                .any(|r| !r.templated && r.uri == uri)
        }) {
            return Ok(slot.name.clone());
        }

        servers
            .iter()
            .flat_map(|s| {
                s.discovered
                    .templates
                    .iter()
                    .filter(|t| t.matches(uri).is_some())
                    .map(move |t| (t.specificity(), &s.name))
            })
            .max_by_key(|(specificity, _)| *specificity)
            .map(|(_, name)| name.clone())
            .ok_or_else(|| ToolDockError::NotFound(format!("no connected server provides '{uri}'")))
    }

    fn next_request_id(&self) -> String {
        format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    // -----------------------------------------------------------------
    // Call log and metrics
    // -----------------------------------------------------------------

    async fn record(&self, entry: CallLogEntry) {
        {
            let mut metrics = self.metrics.write().await;
            let m = metrics.entry(entry.server.clone()).or_default();
            m.total_calls += 1;
            m.total_duration_ms += entry.duration_ms;
            if entry.success {
                m.successful_calls += 1;
            } else {
                m.failed_calls += 1;
            }
            if entry.error_kind == Some(ErrorKind::Timeout) {
                m.timed_out_calls += 1;
            }
        }

        let mut log = self.log.write().await;
        log.push_back(entry);
        while log.len() > self.config.max_log_entries {
            log.pop_front();
        }
    }

    /// Most recent calls first.
    pub async fn recent_calls(&self, limit: usize) -> Vec<CallLogEntry> {
        let log = self.log.read().await;
        log.iter().rev().take(limit).cloned().collect()
    }

    /// Counters for one server. Zero for an unknown name.
    pub async fn server_metrics(&self, server: &str) -> ServerMetrics {
        let metrics = self.metrics.read().await;
        metrics.get(server).cloned().unwrap_or_default()
    }

    /// Counters for every server.
    pub async fn all_metrics(&self) -> HashMap<String, ServerMetrics> {
        self.metrics.read().await.clone()
    }

    /// Calls routed so far, across all servers.
    pub async fn total_calls(&self) -> u64 {
        let metrics = self.metrics.read().await;
        metrics.values().map(|m| m.total_calls).sum()
    }

    /// Snapshot for a monitoring view.
    pub async fn to_json(&self) -> Value {
        serde_json::json!({
            "total_calls": self.total_calls().await,
            "servers": self.status().await,
            "metrics": self.all_metrics().await,
            "recent_calls": self.recent_calls(10).await,
        })
    }
}

async fn open_transport(server: &ServerConfig) -> ToolDockResult<Arc<dyn Transport>> {
    match server.endpoint()? {
        Endpoint::Stdio { command, args, env } => Ok(Arc::new(
            StdioTransport::spawn(&server.name, command, args, env).await?,
        )),
        Endpoint::Http { url } => Ok(Arc::new(HttpTransport::new(&server.name, url)?)),
    }
}

fn find<'a>(servers: &'a [ServerSlot], name: &str) -> ToolDockResult<&'a ServerSlot> {
    servers
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| ToolDockError::NotFound(format!("unknown server '{name}'")))
}

fn qualify(namespaced: bool, server: &str, name: &str) -> String {
    if namespaced {
        format!("{server}.{name}")
    } else {
        name.to_string()
    }
}

fn decode_listing<T: DeserializeOwned>(server: &str, payload: Value) -> ToolDockResult<Vec<T>> {
    serde_json::from_value(payload).map_err(|e| {
        ToolDockError::Transport(format!("malformed listing from server '{server}': {e}"))
    })
}

fn setup_failure(server: &str, error: ToolDockError) -> ToolDockError {
    match error {
        ToolDockError::Setup { .. } => error,
        other => ToolDockError::Setup {
            server: server.to_string(),
            source: Box::new(other),
        },
    }
}
