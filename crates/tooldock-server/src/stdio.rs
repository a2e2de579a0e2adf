use crate::dispatcher::Dispatcher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tooldock_core::{Response, ToolDockError, ToolDockResult};
use tracing::{error, info, warn};

/// How the stdio loop schedules requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// One request at a time; responses are strictly FIFO.
    Sequential,
    /// Requests run concurrently and respond as they finish.
    #[default]
    Concurrent,
}

/// Serve newline-delimited JSON requests read from `reader`, writing one
/// response line per request to `writer`.
///
/// Returns once `reader` hits EOF and every in-flight request has been
/// answered.
pub async fn serve_stdio<R, W>(
    dispatcher: Arc<Dispatcher>,
    reader: R,
    writer: W,
    mode: ServeMode,
    max_in_flight: usize,
) -> ToolDockResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!(server = %dispatcher.name(), ?mode, "Serving on stdio");
    match mode {
        ServeMode::Sequential => serve_sequential(dispatcher, reader, writer).await,
        ServeMode::Concurrent => {
            serve_concurrent(dispatcher, reader, writer, max_in_flight.max(1)).await
        }
    }
}

async fn serve_sequential<R, W>(
    dispatcher: Arc<Dispatcher>,
    reader: R,
    mut writer: W,
) -> ToolDockResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    while let Some(frame) = next_frame(&mut reader).await? {
        let response = dispatcher.handle_bytes(&frame).await;
        if let Some(frame) = encode(&response) {
            write_frame(&mut writer, &frame).await?;
        }
    }
    info!("stdin closed, shutting down");
    Ok(())
}

async fn serve_concurrent<R, W>(
    dispatcher: Arc<Dispatcher>,
    reader: R,
    mut writer: W,
    max_in_flight: usize,
) -> ToolDockResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(max_in_flight);

    // Single writer so frames from concurrent requests never interleave.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            write_frame(&mut writer, &frame).await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut in_flight = JoinSet::new();
    let mut reader = BufReader::new(reader);

    while let Some(frame) = next_frame(&mut reader).await? {
        while in_flight.try_join_next().is_some() {}

        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ToolDockError::Transport(e.to_string()))?;
        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let response = dispatcher.handle_bytes(&frame).await;
            drop(permit);
            if let Some(frame) = encode(&response) {
                if tx.send(frame).await.is_err() {
                    warn!(id = %response.id, "Output closed, dropping response");
                }
            }
        });
    }

    info!(in_flight = in_flight.len(), "stdin closed, draining");
    while in_flight.join_next().await.is_some() {}
    drop(tx);

    match writer_task.await {
        Ok(result) => result.map_err(ToolDockError::from),
        Err(e) => Err(ToolDockError::Transport(format!("writer task failed: {e}"))),
    }
}

/// The next non-blank line, without surrounding whitespace, or `None` at EOF.
///
/// Lines are read as bytes: one that is not UTF-8 is still a frame and gets
/// its own error response.
async fn next_frame<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(None);
        }
        let frame = buf.trim_ascii();
        if !frame.is_empty() {
            return Ok(Some(frame.to_vec()));
        }
    }
}

fn encode(response: &Response) -> Option<String> {
    match response.to_line() {
        Ok(frame) => Some(frame),
        Err(e) => {
            error!(id = %response.id, error = %e, "Failed to encode response");
            None
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &str) -> std::io::Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
