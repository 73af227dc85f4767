use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Detects signals sent to the process: Ctrl-C everywhere and SIGTERM on unix, which is what
/// `dwell stop` sends. Returns early if something else cancels first.
///
/// On Windows detached processes can't detect signals sent to them, so there `dwell stop`
/// terminates the process outright.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C");
        },
        _ = terminate() => {
            info!("Received termination request");
        },
        _ = cancelation.cancelled() => return,
    };
    cancelation.cancel();
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::warn!("Can't listen for SIGTERM {e:?}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
