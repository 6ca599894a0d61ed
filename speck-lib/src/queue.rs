//! Single-flight command queue.
//!
//! A Speck answers exactly one report per command and cannot interleave
//! transactions, so every exchange for a connection goes through one worker task
//! that writes a report, reads the reply and verifies it before touching the next
//! queued item.

use crate::constants::REPORT_ID;
use crate::error::{Result, SpeckError};
use crate::frame::{Command, CommandFrame, CommandIdSequence, ResponseFrame};
use crate::transport::{Connection, HidTransport};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

struct QueueItem {
    command: Command,
    command_id: u8,
    report: Bytes,
    enqueued_at: Instant,
    reply: oneshot::Sender<Result<ResponseFrame>>,
}

pub struct CommandQueue {
    sender: mpsc::UnboundedSender<QueueItem>,
    ids: CommandIdSequence,
    worker: JoinHandle<()>,
}

impl CommandQueue {
    /// Starts the worker for `connection`. Responses are read as `report_len` byte reports.
    pub fn spawn<T: HidTransport + 'static>(
        transport: Arc<T>,
        connection: Connection,
        report_len: usize,
        ids: CommandIdSequence,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(transport, connection, report_len, receiver));
        Self { sender, ids, worker }
    }

    /// Stamps `frame` with the next command ID and queues it.
    ///
    /// The ID is assigned and the item queued before this returns, so the order of
    /// `enqueue` calls is the order the device sees, even if the returned futures are
    /// awaited in a different order.
    pub fn enqueue(&self, frame: CommandFrame) -> impl Future<Output = Result<ResponseFrame>> + Send + 'static {
        let command = frame.command();
        let command_id = self.ids.next();
        let (reply, response) = oneshot::channel();
        let queued = self
            .sender
            .send(QueueItem {
                command,
                command_id,
                report: frame.seal(command_id),
                enqueued_at: Instant::now(),
                reply,
            })
            .map_err(|_| SpeckError::QueueClosed);

        async move {
            queued?;
            response.await.map_err(|_| SpeckError::QueueClosed)?
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run<T: HidTransport>(
    transport: Arc<T>,
    connection: Connection,
    report_len: usize,
    mut receiver: mpsc::UnboundedReceiver<QueueItem>,
) {
    while let Some(item) = receiver.recv().await {
        let result = dispatch(transport.as_ref(), connection, report_len, &item).await;
        if let Err(e) = &result {
            warn!(command = %item.command, id = item.command_id, "Command failed: {}", e);
        }
        // The caller may have stopped waiting; the queue moves on regardless.
        let _ = item.reply.send(result);
    }
    debug!(connection = connection.connection_id, "Command queue closed");
}

async fn dispatch<T: HidTransport>(
    transport: &T,
    connection: Connection,
    report_len: usize,
    item: &QueueItem,
) -> Result<ResponseFrame> {
    debug!(
        command = %item.command,
        id = item.command_id,
        queued_for = ?item.enqueued_at.elapsed(),
        bytes = hex::encode(&item.report),
        "Report write"
    );
    transport.send(connection, REPORT_ID, &item.report).await?;

    let (_report_id, data) = transport.receive(connection, report_len).await?;
    debug!(id = item.command_id, bytes = hex::encode(&data), "Report read");

    ResponseFrame::parse(data, item.command_id)
}
