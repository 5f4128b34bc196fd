use tokio::sync::watch;

use crate::error::ShutdownError;

/// Set up a shutdown channel triggered by SIGINT/SIGTERM (and SIGHUP on unix).
///
/// Returns the sender (for tasks that stop on their own) and a receiver to
/// hand out via `subscribe()`. Can only be called once per process.
pub fn setup_shutdown() -> Result<(watch::Sender<()>, watch::Receiver<()>), ShutdownError> {
    let (tx, rx) = watch::channel(());
    let shutdown_tx = tx.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown signal received, stopping gracefully...");
        let _ = shutdown_tx.send(());
    })?;
    Ok((tx, rx))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_fires_shutdown() {
        let (_tx, mut rx) = setup_shutdown().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("SIGTERM did not reach the shutdown channel")
            .unwrap();
    }
}
