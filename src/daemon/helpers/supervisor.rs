use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::daemon::config::HelperSpec;

use super::{process::HelperProcess, HelperState, HelperStatus, Reply};

/// What happens after a helper process is gone.
enum Next {
    Restart,
    Stop,
}

/// Keeps one helper process alive and serves queued requests against it. A helper that
/// exits for any reason is relaunched after a fixed delay, forever.
pub struct HelperSupervisor {
    name: Arc<str>,
    spec: HelperSpec,
    restart_delay: Duration,
    requests: mpsc::Receiver<Reply>,
    status: watch::Sender<HelperStatus>,
    shutdown: CancellationToken,
    launches: u32,
}

impl HelperSupervisor {
    pub(super) fn new(
        name: Arc<str>,
        spec: HelperSpec,
        restart_delay: Duration,
        requests: mpsc::Receiver<Reply>,
        status: watch::Sender<HelperStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name,
            spec,
            restart_delay,
            requests,
            status,
            shutdown,
            launches: 0,
        }
    }

    fn set_state(&self, state: HelperState) {
        debug!("Helper {} is {state:?}", self.name);
        self.status.send_replace(HelperStatus {
            state,
            launches: self.launches,
        });
    }

    /// Executes the supervision loop until shutdown.
    #[instrument(skip(self), fields(helper = %self.name))]
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.set_state(HelperState::Starting);
            let next = match HelperProcess::spawn(&self.spec) {
                Ok(process) => {
                    self.launches += 1;
                    self.set_state(HelperState::Running);
                    info!("Helper {} launched", self.name);
                    self.serve(process).await
                }
                Err(e) => {
                    error!("Failed to launch helper {}: {e:?}", self.name);
                    Next::Restart
                }
            };

            if let Next::Stop = next {
                break;
            }

            self.set_state(HelperState::Crashed);
            if let Next::Stop = self.back_off().await {
                break;
            }
        }

        self.set_state(HelperState::Stopped);
        Ok(())
    }

    /// Answers requests until the process dies or shutdown is requested.
    async fn serve(&mut self, mut process: HelperProcess) -> Next {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    process.stop().await;
                    return Next::Stop;
                }
                status = process.wait() => {
                    warn!("Helper {} exited with {status:?}", self.name);
                    return Next::Restart;
                }
                request = self.requests.recv() => {
                    // Every handle was dropped, nobody can ask anything anymore.
                    let Some(reply) = request else {
                        process.stop().await;
                        return Next::Stop;
                    };

                    let response = tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            let _ = reply.send(None);
                            process.stop().await;
                            return Next::Stop;
                        }
                        response = process.request(&self.spec.request_token) => response,
                    };

                    match response {
                        Ok(line) => {
                            let _ = reply.send(Some(line));
                        }
                        Err(e) => {
                            warn!("Helper {} failed to answer: {e:?}", self.name);
                            let _ = reply.send(None);
                            process.stop().await;
                            return Next::Restart;
                        }
                    }
                }
            }
        }
    }

    /// Waits out the restart delay. Requests arriving in the meantime are answered with
    /// `None` immediately.
    async fn back_off(&mut self) -> Next {
        let deadline = tokio::time::sleep(self.restart_delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return Next::Restart,
                _ = self.shutdown.cancelled() => return Next::Stop,
                request = self.requests.recv() => match request {
                    Some(reply) => {
                        let _ = reply.send(None);
                    }
                    None => return Next::Stop,
                },
            }
        }
    }
}
