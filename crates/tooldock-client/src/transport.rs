//! Client side of the wire: one [`Transport`] per connected server.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tooldock_core::{Request, Response, ToolDockError, ToolDockResult};
use tracing::{debug, error, info, warn};

/// Moves one request to a server and brings back its response.
///
/// Implementations surface channel failures as
/// [`ToolDockError::Transport`] and never retry on their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> ToolDockResult<Response>;

    /// Tear down the underlying channel. Requests still waiting fail with a
    /// transport error.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Response>>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Newline-delimited JSON over a child process's stdin/stdout.
///
/// Responses are matched to requests by id, so any number of requests may
/// be in flight and the server may answer them in any order.
pub struct StdioTransport {
    label: String,
    writer: Mutex<Option<BoxedWriter>>,
    child: Mutex<Option<Child>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl StdioTransport {
    /// Spawn `command` and attach to its stdio. The child is killed when
    /// the transport is closed or dropped.
    pub async fn spawn(
        label: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> ToolDockResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ToolDockError::Transport(format!("failed to spawn server '{label}' ({command}): {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolDockError::Transport(format!("server '{label}' stdin not available")))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ToolDockError::Transport(format!("server '{label}' stdout not available"))
        })?;

        info!(server = %label, command = %command, pid = child.id(), "Spawned server");
        let transport = Self::from_pipes(label, stdout, stdin);
        *transport.child.lock().await = Some(child);
        Ok(transport)
    }

    /// Attach to an already-open byte stream pair.
    pub fn from_pipes<R, W>(label: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(
            label.to_string(),
            reader,
            pending.clone(),
            closed.clone(),
        ));

        Self {
            label: label.to_string(),
            writer: Mutex::new(Some(Box::new(writer))),
            child: Mutex::new(None),
            pending,
            closed,
            reader,
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }

    async fn forget(&self, id: &str) {
        self.pending.lock().await.remove(id);
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, request: Request) -> ToolDockResult<Response> {
        let line = request.to_line()?;
        let id = request.id;
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            // Checked under the lock the reader takes before clearing.
            if self.closed.load(Ordering::SeqCst) {
                return Err(ToolDockError::Transport(format!(
                    "server '{}' is not running",
                    self.label
                )));
            }
            if pending.contains_key(&id) {
                return Err(ToolDockError::Validation(format!(
                    "request id '{id}' is already in flight"
                )));
            }
            pending.insert(id.clone(), tx);
        }

        if let Err(e) = self.write_line(&line).await {
            self.forget(&id).await;
            warn!(server = %self.label, error = %e, "Failed to write request");
            return Err(ToolDockError::Transport(format!(
                "failed to write to server '{}': {e}",
                self.label
            )));
        }
        debug!(server = %self.label, id = %id, "Request sent");

        rx.await.map_err(|_| {
            ToolDockError::Transport(format!(
                "server '{}' closed the connection before responding",
                self.label
            ))
        })
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.writer.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                debug!(server = %self.label, error = %e, "Server already exited");
            }
        }
        self.reader.abort();
        self.pending.lock().await.clear();
        info!(server = %self.label, "Transport closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Route response lines to their waiting requests until the stream ends.
async fn read_loop<R>(label: String, reader: R, pending: PendingMap, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!(server = %label, "Server stdout closed");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Response>(trimmed) {
                    Ok(resp) => {
                        let waiter = pending.lock().await.remove(&resp.id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(resp);
                            }
                            None => debug!(server = %label, id = %resp.id, "Unsolicited response"),
                        }
                    }
                    Err(e) => {
                        debug!(server = %label, error = %e, "Ignoring non-protocol line");
                    }
                }
            }
            Err(e) => {
                error!(server = %label, error = %e, "Error reading server stdout");
                break;
            }
        }
    }

    let mut pending = pending.lock().await;
    closed.store(true, Ordering::SeqCst);
    if !pending.is_empty() {
        warn!(server = %label, in_flight = pending.len(), "Server went away with requests in flight");
    }
    pending.clear();
}

/// One POST per request to a fixed endpoint.
pub struct HttpTransport {
    label: String,
    url: String,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl HttpTransport {
    /// A transport posting to `url`. Fails if the HTTP client cannot be built.
    pub fn new(label: &str, url: &str) -> ToolDockResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ToolDockError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            label: label.to_string(),
            url: url.to_string(),
            client,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> ToolDockResult<Response> {
        if self.is_closed() {
            return Err(ToolDockError::Transport(format!(
                "connection to '{}' was closed",
                self.label
            )));
        }

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ToolDockError::Transport(format!("request to '{}' failed: {e}", self.label))
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolDockError::Transport(format!(
                "server '{}' returned HTTP {status}",
                self.label
            )));
        }

        let body = resp.text().await.map_err(|e| {
            ToolDockError::Transport(format!("reading response from '{}' failed: {e}", self.label))
        })?;
        serde_json::from_str(&body).map_err(|e| {
            ToolDockError::Transport(format!("garbled response from '{}': {e}", self.label))
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_responses_routed_by_id() {
        let (client_end, server_end) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_end);
        let transport = Arc::new(StdioTransport::from_pipes("t", client_read, client_write));

        let (server_read, mut server_write) = tokio::io::split(server_end);
        let echo = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let first = lines.next_line().await.unwrap().unwrap();
            let second = lines.next_line().await.unwrap().unwrap();
            // Answer in reverse order.
            for line in [second, first] {
                let req: Request = serde_json::from_str(&line).unwrap();
                let resp = Response::success(req.id.clone(), serde_json::json!(req.id));
                server_write
                    .write_all(format!("{}\n", resp.to_line().unwrap()).as_bytes())
                    .await
                    .unwrap();
            }
        });

        let a = transport.send(Request::list_tools("a"));
        let b = transport.send(Request::list_tools("b"));
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap().payload, "a");
        assert_eq!(b.unwrap().payload, "b");
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_fails_in_flight_request() {
        let (client_end, server_end) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_end);
        let transport = StdioTransport::from_pipes("t", client_read, client_write);

        let server = tokio::spawn(async move {
            let (server_read, _server_write) = tokio::io::split(server_end);
            let mut lines = BufReader::new(server_read).lines();
            let _ = lines.next_line().await;
            // Dropping both halves closes the stream.
        });

        let err = transport.send(Request::list_tools("1")).await.unwrap_err();
        assert!(matches!(err, ToolDockError::Transport(_)));
        server.await.unwrap();

        let err = transport.send(Request::list_tools("2")).await.unwrap_err();
        assert!(matches!(err, ToolDockError::Transport(_)));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (client_end, _server_end) = duplex(64);
        let (r, w) = tokio::io::split(client_end);
        let transport = StdioTransport::from_pipes("t", r, w);
        transport.close().await;
        assert!(transport.is_closed());
        assert!(transport.send(Request::list_tools("x")).await.is_err());
    }
}
