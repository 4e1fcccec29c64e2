//! Background worker that keeps the registry in sync with its repositories.
//!
//! Every check period the worker re-reads the configuration, pushes the
//! snapshot into the dispatcher, and sweeps for outdated objects. The
//! worker is a single spawned task with watch-channel cancellation;
//! enabling and disabling are idempotent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::dispatcher::LoadingDispatcher;
use crate::reader::ConfigReader;

const CHECK_PERIOD: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PeriodicUpdater {
    inner: Arc<UpdaterInner>,
}

struct UpdaterInner {
    reader: ConfigReader,
    dispatcher: LoadingDispatcher,
    worker: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl PeriodicUpdater {
    #[must_use]
    pub fn new(reader: ConfigReader, dispatcher: LoadingDispatcher) -> Self {
        Self {
            inner: Arc::new(UpdaterInner {
                reader,
                dispatcher,
                worker: Mutex::new(None),
            }),
        }
    }

    /// Start or stop the background worker. Enabling twice keeps the
    /// existing worker; disabling waits for it to finish.
    pub async fn enable(&self, enable: bool) {
        let mut worker = self.inner.worker.lock().await;
        if enable {
            if worker.is_some() {
                return;
            }
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let reader = self.inner.reader.clone();
            let dispatcher = self.inner.dispatcher.clone();
            let handle = tokio::spawn(async move {
                run_updates(reader, dispatcher, shutdown_rx).await;
            });
            *worker = Some((shutdown_tx, handle));
        } else if let Some((shutdown_tx, handle)) = worker.take() {
            let _ = shutdown_tx.send(true);
            if let Err(error) = handle.await {
                tracing::error!(%error, "periodic updater task failed");
            }
        }
    }
}

async fn run_updates(
    reader: ConfigReader,
    dispatcher: LoadingDispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(CHECK_PERIOD);
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("periodic updater stopping");
                return;
            }
        }

        let snapshot = reader.read().await;
        dispatcher.set_configuration(snapshot).await;
        dispatcher.reload_outdated().await;
    }
}
