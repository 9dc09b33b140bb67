//! A broadcast stop signal shared by the server and every `ListAndWatch` stream.
use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable handle that can stop the plugin from anywhere.
///
/// Stopping is one way: once [`Stopper::stop`] is called every clone observes it, including
/// clones made afterwards.
#[derive(Clone, Debug)]
pub struct Stopper {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Stopper {
    /// Returns a stopper that has not been triggered
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Stopper {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signals everything holding a clone of this stopper to stop. Calling it again is a no-op.
    pub fn stop(&self) {
        // Every clone holds a receiver, so the send can't fail while `self` is alive
        let _ = self.sender.send(true);
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `stop` has been called, immediately if it already was.
    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_stop_wakes_all_clones() {
        let stopper = Stopper::new();
        assert!(!stopper.is_stopped());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let stopper = stopper.clone();
                tokio::spawn(async move { stopper.wait().await })
            })
            .collect();

        stopper.stop();
        for waiter in waiters {
            timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter should have been woken")
                .expect("waiter should not panic");
        }
        assert!(stopper.is_stopped());
    }

    #[tokio::test]
    async fn test_wait_after_stop_returns_immediately() {
        let stopper = Stopper::new();
        stopper.stop();
        stopper.stop();
        let late_clone = stopper.clone();
        timeout(Duration::from_millis(100), late_clone.wait())
            .await
            .expect("an already stopped stopper should not block");
        assert!(late_clone.is_stopped());
    }
}
