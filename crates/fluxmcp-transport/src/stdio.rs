//! Standard I/O transport: newline-delimited JSON.
//!
//! One JSON-RPC message per line, terminated by `\n`; a `\r` before the
//! terminator is tolerated on read and never produced on write. Framing
//! errors reject the single frame and keep the session alive; stream EOF
//! and read errors close it.
//!
//! The same type serves both roles:
//!
//! - [`StdioTransport::current_process`] speaks over this process's
//!   stdin/stdout — the server side. Nothing else may write to stdout;
//!   diagnostics go to stderr via `tracing`.
//! - [`StdioTransport::spawn`] launches a child process from
//!   [`StdioChildParams`] and speaks over its pipes — the client side.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, trace, warn};

use fluxmcp_protocol::{JsonRpcMessage, MAX_MESSAGE_SIZE, jsonrpc};

use crate::callbacks::{EventSink, TransportCallbacks};
use crate::error::{TransportError, TransportResult};
use crate::message::SendOptions;
use crate::traits::Transport;

type BoxedRead = Pin<Box<dyn AsyncRead + Send + 'static>>;
type BoxedWrite = Pin<Box<dyn AsyncWrite + Send + 'static>>;
type LineReader = FramedRead<BufReader<BoxedRead>, LinesCodec>;
type LineWriter = FramedWrite<BoxedWrite, LinesCodec>;

/// What to do with a spawned child's stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StderrMode {
    /// Let the child share this process's stderr.
    #[default]
    Inherit,
    /// Send it to the null device.
    Discard,
    /// Pipe it; retrieve with [`StdioTransport::take_stderr`] after start.
    Piped,
}

/// How to launch a child MCP server.
#[derive(Debug, Clone)]
pub struct StdioChildParams {
    /// Executable to run.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables; the child inherits the rest.
    pub env: HashMap<String, String>,
    /// Working directory, defaulting to the parent's.
    pub cwd: Option<PathBuf>,
    /// Stderr disposition.
    pub stderr: StderrMode,
}

impl StdioChildParams {
    /// Parameters running `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            stderr: StderrMode::Inherit,
        }
    }

    /// Append arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the child's working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Choose the stderr disposition.
    pub fn stderr(mut self, mode: StderrMode) -> Self {
        self.stderr = mode;
        self
    }
}

enum StreamSource {
    /// This process's stdin/stdout.
    ProcessStdio,
    /// Spawn a child at start.
    Child(StdioChildParams),
    /// Pre-built streams, used by tests.
    Raw {
        reader: Option<BoxedRead>,
        writer: Option<BoxedWrite>,
    },
}

/// Line-framed JSON transport over stdio pipes.
pub struct StdioTransport {
    source: TokioMutex<StreamSource>,
    callbacks: StdMutex<TransportCallbacks>,
    sink: StdMutex<Option<EventSink>>,
    writer: Arc<TokioMutex<Option<LineWriter>>>,
    child: Arc<TokioMutex<Option<Child>>>,
    stderr: StdMutex<Option<ChildStderr>>,
    reader_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
}

impl StdioTransport {
    /// Transport over the current process's stdin/stdout (server side).
    pub fn current_process() -> Self {
        Self::with_source(StreamSource::ProcessStdio)
    }

    /// Transport that will spawn `params` at start (client side).
    pub fn spawn(params: StdioChildParams) -> Self {
        Self::with_source(StreamSource::Child(params))
    }

    /// Transport over arbitrary streams; `reader` is what we read from,
    /// `writer` what we write to.
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self::with_source(StreamSource::Raw {
            reader: Some(Box::pin(reader)),
            writer: Some(Box::pin(writer)),
        })
    }

    fn with_source(source: StreamSource) -> Self {
        Self {
            source: TokioMutex::new(source),
            callbacks: StdMutex::new(TransportCallbacks::new()),
            sink: StdMutex::new(None),
            writer: Arc::new(TokioMutex::new(None)),
            child: Arc::new(TokioMutex::new(None)),
            stderr: StdMutex::new(None),
            reader_task: StdMutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The child's piped stderr, when spawned with [`StderrMode::Piped`].
    /// Available once after `start`.
    pub fn take_stderr(&self) -> Option<ChildStderr> {
        self.stderr.lock().expect("stderr mutex poisoned").take()
    }

    fn sink(&self) -> Option<EventSink> {
        self.sink.lock().expect("sink mutex poisoned").clone()
    }

    async fn open_streams(&self) -> TransportResult<(BoxedRead, BoxedWrite)> {
        let mut source = self.source.lock().await;
        match &mut *source {
            StreamSource::ProcessStdio => Ok((
                Box::pin(tokio::io::stdin()) as BoxedRead,
                Box::pin(tokio::io::stdout()) as BoxedWrite,
            )),
            StreamSource::Child(params) => {
                let mut command = Command::new(&params.command);
                command
                    .args(&params.args)
                    .envs(&params.env)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(match params.stderr {
                        StderrMode::Inherit => Stdio::inherit(),
                        StderrMode::Discard => Stdio::null(),
                        StderrMode::Piped => Stdio::piped(),
                    })
                    .kill_on_drop(true);
                if let Some(dir) = &params.cwd {
                    command.current_dir(dir);
                }

                let mut child = command.spawn().map_err(|e| {
                    TransportError::ConnectFailed(format!(
                        "failed to spawn {}: {e}",
                        params.command
                    ))
                })?;

                let stdout = child.stdout.take().ok_or_else(|| {
                    TransportError::ConnectFailed("child stdout was not piped".into())
                })?;
                let stdin = child.stdin.take().ok_or_else(|| {
                    TransportError::ConnectFailed("child stdin was not piped".into())
                })?;
                if params.stderr == StderrMode::Piped {
                    *self.stderr.lock().expect("stderr mutex poisoned") = child.stderr.take();
                }

                *self.child.lock().await = Some(child);
                Ok((Box::pin(stdout) as BoxedRead, Box::pin(stdin) as BoxedWrite))
            }
            StreamSource::Raw { reader, writer } => {
                let reader = reader.take().ok_or_else(|| {
                    TransportError::Configuration("raw reader already consumed".into())
                })?;
                let writer = writer.take().ok_or_else(|| {
                    TransportError::Configuration("raw writer already consumed".into())
                })?;
                Ok((reader, writer))
            }
        }
    }

    fn spawn_reader(&self, reader: LineReader, sink: EventSink) {
        let connected = Arc::clone(&self.connected);
        let handle = tokio::spawn(async move {
            let mut reader = reader;
            while let Some(result) = reader.next().await {
                match result {
                    Ok(line) => {
                        let line = line.trim_end_matches('\r');
                        if line.is_empty() {
                            continue;
                        }
                        trace!(bytes = line.len(), "stdio frame received");
                        match jsonrpc::decode_str(line) {
                            Ok(message) => sink.message(message, None),
                            Err(e) => {
                                // One bad frame does not end the session.
                                warn!(error = %e, "dropping unparseable stdio frame");
                                sink.error(TransportError::Framing(e.to_string()));
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "stdio read failed");
                        sink.error(TransportError::ReceiveFailed(e.to_string()));
                        break;
                    }
                }
            }
            debug!("stdio reader finished");
            connected.store(false, Ordering::SeqCst);
            sink.closed();
        });
        *self.reader_task.lock().expect("reader task mutex poisoned") = Some(handle);
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn set_callbacks(&self, callbacks: TransportCallbacks) {
        *self.callbacks.lock().expect("callbacks mutex poisoned") = callbacks;
    }

    async fn start(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let callbacks = self
            .callbacks
            .lock()
            .expect("callbacks mutex poisoned")
            .clone();
        let sink = EventSink::new(callbacks);
        *self.sink.lock().expect("sink mutex poisoned") = Some(sink.clone());

        let (reader, writer) = self.open_streams().await?;
        let codec = LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE);
        *self.writer.lock().await = Some(FramedWrite::new(writer, codec.clone()));
        self.spawn_reader(FramedRead::new(BufReader::new(reader), codec), sink.clone());

        self.connected.store(true, Ordering::SeqCst);
        sink.connected();
        debug!("stdio transport started");
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(handle) = self
            .reader_task
            .lock()
            .expect("reader task mutex poisoned")
            .take()
        {
            handle.abort();
        }
        *self.writer.lock().await = None;

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill child process");
            }
        }

        if let Some(sink) = self.sink() {
            sink.closed();
        }
        // Drop the callback block so anything it captures (engine inbox
        // senders included) can be freed.
        *self.sink.lock().expect("sink mutex poisoned") = None;
        *self.callbacks.lock().expect("callbacks mutex poisoned") = TransportCallbacks::new();
        debug!("stdio transport stopped");
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage, _options: SendOptions) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let line = jsonrpc::encode(&message)?;
        // A literal newline inside the frame would split it into two bogus
        // frames on the peer.
        if line.contains('\n') || line.contains('\r') {
            return Err(TransportError::Framing(
                "serialized message contains embedded newline".into(),
            ));
        }

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotConnected)?;
        writer
            .send(line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        SinkExt::<String>::flush(writer)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
