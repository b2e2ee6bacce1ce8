use std::sync::Arc;

use tokio::sync::watch;

/// Number of units of work not yet resolved.
///
/// `add` must happen before the new unit is sent to any queue, `done` is called once per
/// resolved unit. Reaching zero is the only quiescence signal of a run.
#[derive(Debug, Clone)]
pub struct PendingCounter {
    tx: Arc<watch::Sender<usize>>,
}

impl Default for PendingCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCounter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn add(&self, n: usize) {
        self.tx.send_modify(|count| *count += n);
    }

    pub fn done(&self) {
        let mut underflow = false;
        self.tx.send_modify(|count| match count.checked_sub(1) {
            Some(c) => *count = c,
            None => underflow = true,
        });
        if underflow {
            log::error!("Pending counter resolved more units than were added");
        }
    }

    pub fn get(&self) -> usize {
        *self.tx.borrow()
    }

    pub fn is_zero(&self) -> bool {
        self.get() == 0
    }

    /// Resolves as soon as the counter reads zero.
    pub async fn wait_zero(&self) {
        let mut rx = self.tx.subscribe();
        // Cannot fail, `self` keeps the sender alive
        rx.wait_for(|count| *count == 0).await.ok();
    }
}
