use anyhow::Result;

/// The tracker relies on tick bodies, helper supervisors and the feed listener sharing one
/// thread, so the daemon always runs on a current-thread runtime.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
