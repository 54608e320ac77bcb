//! MCP stdio server
//!
//! Reads newline-delimited JSON-RPC frames, dispatches each one on its own task and writes
//! responses through a single exclusive writer. Responses may leave out of arrival order;
//! a response frame is never interleaved with another.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::{Error, ErrorContext, Result};

use super::dispatcher::Dispatcher;
use super::types::{JsonRpcRequest, JsonRpcResponse, INVALID_REQUEST, PARSE_ERROR};

/// Frames longer than this are answered with a parse error and skipped.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Serializes whole frames onto the output stream.
pub struct FrameWriter<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for FrameWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write one response followed by `\n`. The lock is held for the whole frame.
    pub async fn write(&self, response: &JsonRpcResponse) -> Result<()> {
        let mut frame = serde_json::to_vec(response)?;
        frame.push(b'\n');

        let mut out = self.inner.lock().await;
        out.write_all(&frame).await?;
        out.flush().await?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.inner.lock().await.flush().await?;
        Ok(())
    }
}

enum FrameRead {
    Line,
    Oversized,
    Eof,
}

/// Read one `\n`-terminated frame into `buf` without buffering more than `limit` bytes.
async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<FrameRead> {
    let mut overflow = false;
    let mut saw_bytes = false;
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(match (saw_bytes, overflow) {
                    (false, _) => FrameRead::Eof,
                    (true, true) => FrameRead::Oversized,
                    (true, false) => FrameRead::Line,
                });
            }
            saw_bytes = true;
            let (chunk, used, done) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };
            if !overflow {
                if buf.len() + chunk.len() > limit {
                    overflow = true;
                    buf.clear();
                } else {
                    buf.extend_from_slice(chunk);
                }
            }
            (used, done)
        };
        reader.consume(used);
        if done {
            return Ok(if overflow {
                FrameRead::Oversized
            } else {
                FrameRead::Line
            });
        }
    }
}

/// Decode one frame. `Ok(None)` means a blank line.
fn decode_frame(raw: &[u8]) -> std::result::Result<Option<JsonRpcRequest>, JsonRpcResponse> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e))
    })?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(text).map_err(|e| {
        JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e))
    })?;

    if value.is_array() {
        return Err(JsonRpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            "Invalid Request: batch requests are not supported",
        ));
    }

    let id = match value.get("id") {
        Some(id @ (Value::String(_) | Value::Number(_))) => id.clone(),
        _ => Value::Null,
    };
    serde_json::from_value::<JsonRpcRequest>(value)
        .map(Some)
        .map_err(|e| JsonRpcResponse::error(id, INVALID_REQUEST, format!("Invalid Request: {}", e)))
}

pub struct McpServer {
    dispatcher: Dispatcher,
    max_concurrent_requests: usize,
    shutdown_grace: Duration,
    max_frame_bytes: usize,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher, config: &ServerConfig) -> Self {
        Self {
            dispatcher,
            max_concurrent_requests: config.max_concurrent_requests.max(1),
            shutdown_grace: config.shutdown_grace,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit.max(1);
        self
    }

    /// Serve on the process's stdin/stdout until end of input or `shutdown`.
    pub async fn run_stdio(&self, shutdown: CancellationToken) -> Result<()> {
        self.serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown,
        )
        .await
    }

    /// Serve on an arbitrary byte stream pair.
    pub async fn serve<R, W>(&self, mut reader: R, writer: W, shutdown: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = FrameWriter::new(writer);
        let permits = Arc::new(Semaphore::new(self.max_concurrent_requests));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut buf = Vec::new();
        let mut read_error = None;

        info!(
            max_concurrent_requests = self.max_concurrent_requests,
            tools = ?self.dispatcher.registry().names(),
            "MCP server started"
        );

        loop {
            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }

            buf.clear();
            let read = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, no longer accepting frames");
                    break;
                }
                r = read_frame(&mut reader, &mut buf, self.max_frame_bytes) => r,
            };

            let request = match read {
                Ok(FrameRead::Eof) => {
                    debug!("end of input");
                    break;
                }
                Ok(FrameRead::Oversized) => {
                    warn!(limit = self.max_frame_bytes, "dropping oversized frame");
                    let resp = JsonRpcResponse::error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("Parse error: frame exceeds {} bytes", self.max_frame_bytes),
                    );
                    write_or_log(&writer, &resp).await;
                    continue;
                }
                Ok(FrameRead::Line) => match decode_frame(&buf) {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(resp) => {
                        warn!(
                            code = resp.error.as_ref().map(|e| e.code),
                            "rejecting malformed frame"
                        );
                        write_or_log(&writer, &resp).await;
                        continue;
                    }
                },
                Err(e) => {
                    error!(error = %e, "failed to read input stream");
                    read_error = Some(e);
                    break;
                }
            };

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                p = permits.clone().acquire_owned() => p.map_err(|_| {
                    Error::runtime_with_context(
                        "request semaphore closed",
                        ErrorContext::new().with_source("mcp_server"),
                    )
                })?,
            };

            let dispatcher = self.dispatcher.clone();
            let writer = writer.clone();
            tasks.spawn(async move {
                let _permit = permit;
                if let Some(response) = dispatcher.dispatch(request).await {
                    write_or_log(&writer, &response).await;
                }
            });
        }

        self.drain(&mut tasks, &shutdown).await;
        writer.flush().await?;
        info!("MCP server stopped");

        match read_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Let in-flight requests finish. After end of input they run to completion unless a
    /// shutdown arrives; after a shutdown they get `shutdown_grace` before being aborted.
    async fn drain(&self, tasks: &mut JoinSet<()>, shutdown: &CancellationToken) {
        if tasks.is_empty() {
            return;
        }

        if !shutdown.is_cancelled() {
            let finished = tokio::select! {
                _ = join_all(tasks) => true,
                _ = shutdown.cancelled() => false,
            };
            if finished {
                return;
            }
        }

        info!(
            in_flight = tasks.len(),
            grace_ms = self.shutdown_grace.as_millis() as u64,
            "waiting for in-flight requests"
        );
        if tokio::time::timeout(self.shutdown_grace, join_all(tasks))
            .await
            .is_err()
        {
            warn!(
                in_flight = tasks.len(),
                "shutdown grace elapsed, cancelling in-flight requests"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        log_join_error(joined);
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!(error = %e, "request task panicked");
        }
    }
}

async fn write_or_log<W: AsyncWrite + Unpin + Send>(
    writer: &FrameWriter<W>,
    response: &JsonRpcResponse,
) {
    if let Err(e) = writer.write(response).await {
        error!(id = %response.id, error = %e, "failed to write response frame");
    }
}
