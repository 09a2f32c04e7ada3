use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{McpError, Result};
use crate::protocol::Envelope;
use crate::transport::{Transport, frame_to_inbound};
use crate::wire::{Inbound, PeerFault};

/// How messages are delimited on the pipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// One message per line.
    #[default]
    Newline,
    /// `Content-Length: N\r\n\r\n` header before each body.
    ContentLength,
}

/// Transport over a child process's stdin/stdout.
///
/// Stdout is read by a background task that owns all partial-frame state,
/// so abandoning a [`Transport::receive`] never loses bytes of a frame.
pub struct StdioTransport {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    frames: mpsc::UnboundedReceiver<Result<Inbound>>,
    reader: JoinHandle<()>,
    framing: Framing,
}

impl StdioTransport {
    /// Spawn a server process.
    ///
    /// # Arguments
    /// * `command` - The command to spawn (e.g., "mcp-server-sqlite")
    /// * `args` - Arguments to pass to the command
    /// * `env` - Extra environment variables
    /// * `framing` - Message delimiting used by the server
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &[(String, String)],
        framing: Framing,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::spawn_failed(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        tracing::debug!(command, ?framing, pid = ?child.id(), "spawned MCP server");

        let (tx, frames) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_frames(BufReader::new(stdout), framing, tx));

        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            frames,
            reader,
            framing,
        })
    }

    /// Framing in use.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    async fn write_frame(&mut self, json: &str) -> std::io::Result<()> {
        match self.framing {
            Framing::Newline => {
                self.stdin.write_all(json.as_bytes()).await?;
                self.stdin.write_all(b"\n").await?;
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", json.len());
                self.stdin.write_all(header.as_bytes()).await?;
                self.stdin.write_all(json.as_bytes()).await?;
            }
        }
        self.stdin.flush().await
    }
}

/// Reader loop: one message per frame until EOF or a read error.
///
/// EOF drops the sender, which [`Transport::receive`] reports as
/// [`McpError::ConnectionClosed`].
async fn read_frames<R>(mut stdout: R, framing: Framing, tx: mpsc::UnboundedSender<Result<Inbound>>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let frame = match framing {
            Framing::Newline => read_line_frame(&mut stdout).await,
            Framing::ContentLength => read_length_frame(&mut stdout).await,
        };
        match frame {
            Ok(Some(inbound)) => {
                if tx.send(Ok(inbound)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::debug!("MCP server closed stdout");
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

async fn read_line_frame<R: AsyncBufRead + Unpin>(stdout: &mut R) -> Result<Option<Inbound>> {
    let mut line = String::new();
    loop {
        line.clear();
        if stdout.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            continue;
        }
        tracing::trace!(frame = %trimmed, "received MCP frame");
        return Ok(Some(frame_to_inbound(trimmed)));
    }
}

async fn read_length_frame<R: AsyncBufRead + Unpin>(stdout: &mut R) -> Result<Option<Inbound>> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if stdout.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            match len_str.trim().parse() {
                Ok(len) => content_length = Some(len),
                Err(e) => {
                    return Ok(Some(
                        PeerFault::new(format!("invalid Content-Length: {}", e))
                            .with_detail(trimmed)
                            .into(),
                    ));
                }
            }
        } else if content_length.is_none() && !trimmed.contains(':') {
            return Ok(Some(
                PeerFault::new("missing Content-Length header")
                    .with_detail(trimmed)
                    .into(),
            ));
        }
    }

    let Some(content_length) = content_length else {
        return Ok(Some(PeerFault::new("missing Content-Length header").into()));
    };

    let mut body = vec![0u8; content_length];
    match stdout.read_exact(&mut body).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(McpError::Io(e)),
    }

    match String::from_utf8(body) {
        Ok(text) => {
            tracing::trace!(content_length, frame = %text, "received MCP frame");
            Ok(Some(frame_to_inbound(&text)))
        }
        Err(e) => Ok(Some(
            PeerFault::new(format!("invalid UTF-8 in frame: {}", e)).into(),
        )),
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let json = serde_json::to_string(envelope)?;
        tracing::trace!(json = %json, "sending MCP frame");
        self.write_frame(&json)
            .await
            .map_err(|e| McpError::transport_write(e.to_string()))
    }

    async fn receive(&mut self) -> Result<Inbound> {
        self.frames.recv().await.unwrap_or(Err(McpError::ConnectionClosed))
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.stdin.shutdown().await;
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "MCP server already exited");
        }
        self.reader.abort();
        self.frames.close();
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
