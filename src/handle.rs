use crate::{AppendCallback, APPEND_FAILED};
use bytes::Bytes;
use tokio::sync::mpsc;

pub(crate) enum Command {
    Append {
        content: Bytes,
        callback: AppendCallback,
    },
    ConfirmAppend(u64),
    Shutdown,
}

/// Cross-thread handle to a running [`Node`](crate::Node). All methods post
/// onto the loop thread and return immediately; they never block.
#[derive(Clone)]
pub struct Handle {
    commands: mpsc::UnboundedSender<Command>,
}

impl Handle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Handle {
        Handle { commands }
    }

    /// Proposes `content` for the next round. The callback fires exactly once
    /// with an `APPEND_*` status; if the node has already shut down it fires
    /// immediately with [`APPEND_FAILED`](crate::APPEND_FAILED).
    pub fn append(&self, content: impl Into<Bytes>, callback: impl FnOnce(i32) + Send + 'static) {
        let command = Command::Append {
            content: content.into(),
            callback: Box::new(callback),
        };
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            if let Command::Append { callback, .. } = command {
                callback(APPEND_FAILED);
            }
        }
    }

    /// Confirms that the content delivered by `on_append` for `round` is
    /// durably stored. Confirming an unknown or already-confirmed round is a
    /// no-op.
    pub fn confirm_append(&self, round: u64) {
        let _ = self.commands.send(Command::ConfirmAppend(round));
    }

    /// Begins asynchronous teardown; `Node::run` returns once every
    /// connection and task has wound down.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}
