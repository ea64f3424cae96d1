//! Background status polling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A thread that calls `tick` at a fixed interval until stopped
///
/// `tick` returns `false` to end the loop early. Stopping never joins the
/// thread; it exits after its current sleep.
pub struct StatusPoller {
    running: Arc<AtomicBool>,
}

impl StatusPoller {
    /// Start polling every `interval`
    pub fn start<F>(interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        thread::Builder::new()
            .name("status-poller".to_string())
            .spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if !flag.load(Ordering::SeqCst) || !tick() {
                        break;
                    }
                }
                tracing::debug!("Status poller stopped");
            })?;
        Ok(Self { running })
    }

    /// Ask the thread to exit
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the poller has not been stopped
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
