use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing;

use relay_api::ApiState;
use relay_core::{Config, RelayContext};
use relay_delivery::{Dispatcher, DispatcherConfig, ExpoProvider};
use relay_notify::ENVELOPE_DEADLINE;
use relay_upstream::Session;

/// Composes the store, providers, dispatcher, upstream session and relay
/// consumer, and owns their lifecycle.
pub struct Supervisor {
    ctx: RelayContext,
    dispatcher: Arc<Dispatcher>,
    session: Session,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl Supervisor {
    /// Opens the store and builds every component. A store-open failure is
    /// fatal and surfaces here.
    pub fn init(config: Config) -> Result<Self> {
        let ctx = RelayContext::new(config).context("opening store")?;

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&ctx.store),
            DispatcherConfig::from(&ctx.config.expo),
        );
        let expo = ExpoProvider::new(&ctx.config.expo).context("building expo provider")?;
        dispatcher.register_provider(Arc::new(expo));

        let session = Session::new(ctx.config.socket.clone());

        tracing::info!("push relay initialized");

        Ok(Supervisor {
            ctx,
            dispatcher: Arc::new(dispatcher),
            session,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Starts the upstream session and the relay consumer. Returns once the
    /// session loop is issuing its first connect attempt.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("supervisor already started");
            return;
        }

        let channels = self.session.start();

        let ctx = self.ctx.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let cancel = self.cancel.clone();
        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            if let Err(e) = relay_notify::run(
                ctx,
                dispatcher,
                channels.envelopes,
                channels.events,
                cancel,
                tracker,
            )
            .await
            {
                tracing::error!("relay consumer error: {}", e);
            }
        });

        tracing::info!("push relay started");
    }

    /// Cancels the session, waits for in-flight envelope tasks (bounded by
    /// their own deadline), then closes the store.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("stopping push relay");

        self.session.shutdown();
        self.cancel.cancel();

        self.tracker.close();
        if tokio::time::timeout(ENVELOPE_DEADLINE + Duration::from_secs(1), self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!("timed out waiting for in-flight envelopes");
        }

        if let Err(e) = self.ctx.store.close().await {
            tracing::error!("closing store: {}", e);
        }

        tracing::info!("push relay stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && self.session.is_connected()
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            ctx: self.ctx.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            session_connected: self.session.connected_handle(),
        }
    }
}
