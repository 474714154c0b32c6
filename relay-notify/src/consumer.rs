use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing;

use relay_core::types::Envelope;
use relay_core::RelayContext;
use relay_delivery::Dispatcher;
use relay_upstream::SessionEvent;

use crate::service::RelayService;

/// Hard deadline for one envelope, dispatch calls included.
pub const ENVELOPE_DEADLINE: Duration = Duration::from_secs(30);

/// Consumes the upstream session's channels until cancelled.
///
/// Every envelope gets its own task on `tracker` so shutdown can wait for
/// in-flight work; there is no ordering across envelopes.
pub async fn run(
    ctx: RelayContext,
    dispatcher: Arc<Dispatcher>,
    mut envelopes: mpsc::Receiver<Envelope>,
    mut events: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) -> Result<()> {
    tracing::info!("starting relay consumer");

    let service = Arc::new(RelayService::new(ctx, dispatcher));
    let mut events_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv(), if events_open => match event {
                Some(SessionEvent::Connected) => {
                    tracing::info!("upstream session connected");
                }
                Some(SessionEvent::Disconnected) => {
                    tracing::warn!("upstream session disconnected");
                }
                Some(SessionEvent::Error(e)) => {
                    tracing::error!("upstream session error: {}", e);
                }
                None => events_open = false,
            },
            envelope = envelopes.recv() => match envelope {
                Some(envelope) => {
                    let service = Arc::clone(&service);
                    let cancel = cancel.clone();
                    tracker.spawn(async move {
                        let kind = envelope.kind.clone();
                        match tokio::time::timeout(
                            ENVELOPE_DEADLINE,
                            service.process_envelope(&cancel, envelope),
                        )
                        .await
                        {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                tracing::error!("error processing {} envelope: {}", kind, e);
                            }
                            Err(_) => {
                                tracing::error!("{} envelope timed out after {:?}", kind, ENVELOPE_DEADLINE);
                            }
                        }
                    });
                }
                None => {
                    tracing::info!("envelope channel closed");
                    break;
                }
            },
        }
    }

    tracing::info!("relay consumer stopped");
    Ok(())
}
