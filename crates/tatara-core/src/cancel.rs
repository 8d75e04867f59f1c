use tokio::sync::watch;

/// Raises the stop notification observed by every [`StopSignal`] clone.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Cooperative cancellation checked at long-running suspension points
/// (image pulls, image builds, artifact streaming).
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected stop handle and signal.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

impl StopSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested. Pends forever if the handle
    /// was dropped without stopping.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn stop_wakes_waiters() {
        let (handle, signal) = stop_channel();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.stopped().await }
        });
        handle.stop();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn never_does_not_resolve() {
        let signal = StopSignal::never();
        assert!(!signal.is_stopped());
        let result = tokio::time::timeout(Duration::from_secs(5), signal.stopped()).await;
        assert!(result.is_err());
    }
}
