//! Trailing-edge debouncer
//!
//! Coalesces calls within a quiet window into one invocation carrying the
//! most recent argument. Callers are synchronous (event handlers); the
//! action runs on its own task so a slow action never delays the next cycle.

use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Action<T> = Box<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

enum Command<T> {
    Call(T),
    Flush(oneshot::Sender<Option<JoinHandle<()>>>),
    Cancel,
}

/// Debouncer bound to a tokio runtime
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn the debounce worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F>(window: Duration, action: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(window, rx, Box::new(action)));
        Self { tx, worker }
    }

    /// Schedule the action with `value`, replacing any pending value and
    /// restarting the quiet window
    pub fn call(&self, value: T) {
        if self.tx.send(Command::Call(value)).is_err() {
            tracing::debug!("debouncer closed, call dropped");
        }
    }

    /// Fire a pending call now and wait for its action to finish
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).is_err() {
            return;
        }
        if let Ok(Some(handle)) = ack_rx.await {
            let _ = handle.await;
        }
    }

    /// Drop a pending call without firing it
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel);
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

impl<T> std::fmt::Debug for Debouncer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

async fn run<T: Send + 'static>(
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<Command<T>>,
    action: Action<T>,
) {
    let mut pending: Option<T> = None;
    let sleep = tokio::time::sleep(window);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                None => break,
                Some(Command::Call(value)) => {
                    pending = Some(value);
                    sleep.as_mut().reset(Instant::now() + window);
                }
                Some(Command::Flush(ack)) => {
                    let handle = pending.take().map(|value| tokio::spawn(action(value)));
                    let _ = ack.send(handle);
                }
                Some(Command::Cancel) => {
                    pending = None;
                }
            },
            () = &mut sleep, if pending.is_some() => {
                if let Some(value) = pending.take() {
                    tokio::spawn(action(value));
                }
            }
        }
    }
}
