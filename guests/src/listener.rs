//! Change propagation listener.
//!
//! Folds remote changes into a station's store as they arrive. The loop is
//! subscribe, fold until the stream ends, wait, subscribe again:
//!
//! ```text
//! loop {
//!     subscribe ──err──> wait retry_delay
//!        │
//!     fold each change ──stream ended──> wait retry_delay
//! }
//! ```
//!
//! Stream errors are logged and skipped. Folds are idempotent, so a change
//! delivered twice across a reconnect is harmless.

use crate::actions::GuestAction;
use crate::ports::{ChangeFeed, ChangeStream};
use crate::reducer::{GuestEnvironment, GuestReducer};
use crate::state::GuestState;
use checkin_runtime::Store;
use futures::StreamExt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Store specialised to guest state.
pub type GuestStore = Store<GuestState, GuestAction, GuestEnvironment, GuestReducer>;

/// Background task folding remote changes into a store.
pub struct ChangeListener {
    name: String,
    feed: Arc<dyn ChangeFeed>,
    store: GuestStore,
    retry_delay: Duration,
}

impl ChangeListener {
    /// Listener with a five second reconnect delay.
    #[must_use]
    pub fn new(name: impl Into<String>, feed: Arc<dyn ChangeFeed>, store: GuestStore) -> Self {
        Self {
            name: name.into(),
            feed,
            store,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Set the delay between a lost subscription and the next attempt.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Start the loop on a background task.
    #[must_use]
    pub fn spawn(self) -> ListenerHandle {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(self.run(signal));
        ListenerHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(listener = %self.name, "Change listener started");

        loop {
            tokio::select! {
                Ok(()) = shutdown.changed() => break,
                subscribed = self.feed.subscribe() => {
                    match subscribed {
                        Ok(stream) => {
                            info!(listener = %self.name, "Subscribed to guest changes");
                            if self.fold(stream, &mut shutdown).await.is_break() {
                                break;
                            }
                            warn!(
                                listener = %self.name,
                                "Change stream ended, resubscribing in {:?}",
                                self.retry_delay
                            );
                        },
                        Err(e) => {
                            error!(
                                listener = %self.name,
                                error = %e,
                                "Failed to subscribe, retrying in {:?}",
                                self.retry_delay
                            );
                        },
                    }
                },
            }

            tokio::select! {
                Ok(()) = shutdown.changed() => break,
                () = tokio::time::sleep(self.retry_delay) => {},
            }
        }

        info!(listener = %self.name, "Change listener stopped");
    }

    /// Fold changes until the stream ends or shutdown is signalled.
    async fn fold(
        &self,
        mut stream: ChangeStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ControlFlow<()> {
        loop {
            tokio::select! {
                Ok(()) = shutdown.changed() => return ControlFlow::Break(()),
                next = stream.next() => match next {
                    Some(Ok(change)) => {
                        let action = GuestAction::ApplyRemoteChange { change };
                        if let Err(e) = self.store.send(action).await {
                            warn!(
                                listener = %self.name,
                                error = %e,
                                "Store stopped accepting changes"
                            );
                            return ControlFlow::Break(());
                        }
                    },
                    Some(Err(e)) => {
                        error!(listener = %self.name, error = %e, "Error receiving change");
                    },
                    None => return ControlFlow::Continue(()),
                },
            }
        }
    }
}

/// Handle to a running [`ChangeListener`].
///
/// Dropping the handle leaves the listener running.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop delivery, release the subscription and wait for the task.
    pub async fn cancel(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Change listener task failed");
        }
    }

    /// Whether the listener loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
