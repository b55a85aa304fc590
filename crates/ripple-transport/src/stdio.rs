//! Stdio line transport
//!
//! Inbound envelopes arrive on stdin, outbound envelopes leave on stdout,
//! one JSON document per line. Logging must never touch stdout.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use ripple_core::{RippleError, RippleResult};
use ripple_wire::{decode_line, Inbound, Message};

use crate::OutboxReceiver;

/// Inbound envelope receiver
pub type InboundReceiver = mpsc::Receiver<Inbound>;

/// Start a background loop reading envelopes from stdin
pub fn spawn_stdin_reader(buffer_size: usize) -> InboundReceiver {
    spawn_line_reader(BufReader::new(tokio::io::stdin()), buffer_size)
}

/// Start a background loop reading envelopes from any line source.
///
/// Lines that are not UTF-8 or not envelopes are logged and skipped. The
/// returned channel closes when the source reaches EOF or fails to read.
pub fn spawn_line_reader<R>(mut reader: R, buffer_size: usize) -> InboundReceiver
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("stdin read error: {}", e);
                    break;
                }
            }

            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim(),
                Err(e) => {
                    tracing::warn!("Dropping non UTF-8 line: {}", e);
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            match decode_line(line) {
                Ok(inbound) => {
                    if tx.send(inbound).await.is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) => {
                    tracing::warn!("Dropping unparsable envelope: {}", e);
                }
            }
        }
        tracing::debug!("inbound stream closed");
    });

    rx
}

/// Handle on a running line writer
#[derive(Debug)]
pub struct LineWriter {
    task: JoinHandle<RippleResult<()>>,
    drain: Option<oneshot::Sender<()>>,
}

impl LineWriter {
    /// Resolves when the writer stops by itself: every outbox handle was
    /// dropped (`Ok`) or the sink failed (`Err`).
    ///
    /// Must not be polled again once it has resolved.
    pub async fn stopped(&mut self) -> RippleResult<()> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(RippleError::Invariant(format!("writer task failed: {e}"))),
        }
    }

    /// Write everything already queued, then stop.
    ///
    /// Envelopes queued after this call are not written.
    pub async fn finish(mut self, timeout: Duration) -> RippleResult<()> {
        if let Some(drain) = self.drain.take() {
            let _ = drain.send(());
        }

        match tokio::time::timeout(timeout, self.stopped()).await {
            Ok(result) => result,
            Err(_) => {
                self.task.abort();
                Err(RippleError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "output not flushed in time",
                )))
            }
        }
    }
}

/// Start a background loop writing envelopes to stdout
pub fn spawn_stdout_writer(outbound: OutboxReceiver) -> LineWriter {
    spawn_line_writer(tokio::io::stdout(), outbound)
}

/// Start a background loop writing envelopes to any sink, one per line.
///
/// Finishes when every outbox handle has been dropped, when asked to drain
/// (see [`LineWriter::finish`]; dropping the handle also asks), or on the
/// first write error.
pub fn spawn_line_writer<W>(mut writer: W, mut outbound: OutboxReceiver) -> LineWriter
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (drain, mut drain_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                next = outbound.recv() => match next {
                    Some(message) => write_message(&mut writer, &message).await?,
                    None => return Ok(()),
                },
                _ = &mut drain_rx => {
                    while let Ok(message) = outbound.try_recv() {
                        write_message(&mut writer, &message).await?;
                    }
                    return Ok(());
                }
            }
        }
    });

    LineWriter {
        task,
        drain: Some(drain),
    }
}

async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> RippleResult<()> {
    let mut line = match message.encode_line() {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("Dropping unencodable envelope to {}: {}", message.dest, e);
            return Ok(());
        }
    };
    line.push('\n');

    if let Err(e) = write_line(writer, &line).await {
        tracing::error!("stdout write failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
