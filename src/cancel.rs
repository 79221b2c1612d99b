use std::sync::Arc;

use tokio::sync::watch;

/// Owner side of a cancellation signal.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

/// Observer side, passed down the pipeline.
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelSignal(rx))
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal nobody can trigger.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle is dropped first.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
