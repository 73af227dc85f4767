//! Supervision of native helper processes answering OS queries over stdio.
//!
//! Every helper is owned by a [supervisor::HelperSupervisor] task. Callers talk to it through
//! a cloneable [HelperHandle]: a request is queued on a bounded channel, the supervisor writes
//! the request token to the helper and hands the next output line back over a oneshot
//! channel. The supervisor serves the queue one request at a time, so a response line always
//! belongs to the request that was written right before it.

pub mod process;
pub mod supervisor;

use std::{sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::daemon::config::HelperSpec;

use self::supervisor::HelperSupervisor;

const REQUEST_QUEUE_SIZE: usize = 4;

/// Stopped → Starting → Running → Crashed → Starting → ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    Stopped,
    Starting,
    Running,
    Crashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelperStatus {
    pub state: HelperState,
    /// How many times a process was successfully launched.
    pub launches: u32,
}

type Reply = oneshot::Sender<Option<String>>;

#[derive(Clone)]
pub struct HelperHandle {
    name: Arc<str>,
    requests: mpsc::Sender<Reply>,
    status: watch::Receiver<HelperStatus>,
}

impl HelperHandle {
    /// Asks the helper for one response line. Resolves to `None` right away when the helper
    /// isn't running, and to `None` when it dies before answering.
    pub async fn query(&self) -> Option<String> {
        let (sender, receiver) = oneshot::channel();
        if let Err(e) = self.requests.try_send(sender) {
            warn!("Helper {} can't take requests: {e}", self.name);
            return None;
        }
        receiver.await.ok().flatten()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> HelperStatus {
        *self.status.borrow()
    }

    /// Waits until the supervisor reports a status matching `condition`. Returns `None` if
    /// the supervisor is gone.
    pub async fn wait_for_status(
        &self,
        condition: impl FnMut(&HelperStatus) -> bool,
    ) -> Option<HelperStatus> {
        let mut status = self.status.clone();
        let result = status.wait_for(condition).await.ok().map(|v| *v);
        result
    }
}

/// Creates a supervisor for the helper described by `spec` and a handle to query it. Nothing
/// is launched until [HelperSupervisor::run] is polled.
pub fn start_supervised(
    name: &str,
    spec: HelperSpec,
    restart_delay: Duration,
    shutdown: CancellationToken,
) -> (HelperHandle, HelperSupervisor) {
    let name: Arc<str> = name.into();
    let (requests, queue) = mpsc::channel(REQUEST_QUEUE_SIZE);
    let (status_sender, status) = watch::channel(HelperStatus {
        state: HelperState::Stopped,
        launches: 0,
    });

    let handle = HelperHandle {
        name: name.clone(),
        requests,
        status,
    };
    let supervisor = HelperSupervisor::new(name, spec, restart_delay, queue, status_sender, shutdown);
    (handle, supervisor)
}
