use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use eyre::WrapErr;
use tracing::{debug, warn};

use super::{Quote, QuoteEngine};
use crate::{backend::DexBackend, token::SwapDirection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub direction: SwapDirection,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteUpdate {
    pub generation: u64,
    pub request: QuoteRequest,
    pub quote: Quote,
}

/// Coalesces bursts of quote requests. A request is evaluated once no newer
/// one arrived for `delay`, and a result is published only if it still
/// answers the newest request.
pub struct QuoteDebouncer {
    sender: mpsc::UnboundedSender<(u64, QuoteRequest)>,
    latest: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl QuoteDebouncer {
    pub fn spawn<B: DexBackend + ?Sized + 'static>(
        engine: Arc<QuoteEngine<B>>,
        delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<QuoteUpdate>) {
        let (sender, requests) = mpsc::unbounded_channel();
        let (updates, receiver) = mpsc::unbounded_channel();
        let latest = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(run(engine, delay, requests, updates, latest.clone()));
        (
            QuoteDebouncer {
                sender,
                latest,
                handle,
            },
            receiver,
        )
    }

    /// Queues a request and returns its generation number.
    pub fn request(&self, direction: SwapDirection, amount: impl Into<String>) -> u64 {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let request = QuoteRequest {
            direction,
            amount: amount.into(),
        };
        if self.sender.send((generation, request)).is_err() {
            debug!(generation, "quote debouncer stopped, request dropped");
        }
        generation
    }

    /// Stops accepting requests and waits for the pending one to be evaluated.
    /// Fails if the debouncer task panicked or was cancelled.
    pub async fn close(self) -> eyre::Result<()> {
        drop(self.sender);
        self.handle
            .await
            .map_err(|err| {
                warn!(error = %err, "quote debouncer task failed");
                err
            })
            .wrap_err("Quote debouncer task failed")
    }
}

async fn run<B: DexBackend + ?Sized>(
    engine: Arc<QuoteEngine<B>>,
    delay: Duration,
    mut requests: mpsc::UnboundedReceiver<(u64, QuoteRequest)>,
    updates: mpsc::UnboundedSender<QuoteUpdate>,
    latest: Arc<AtomicU64>,
) {
    while let Some(mut pending) = requests.recv().await {
        let mut closed = false;
        loop {
            match timeout(delay, requests.recv()).await {
                Ok(Some(next)) => pending = next,
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let (generation, request) = pending;
        let quote = engine.quote(request.direction, &request.amount).await;
        if generation < latest.load(Ordering::SeqCst) {
            debug!(generation, "dropping stale quote");
        } else if updates
            .send(QuoteUpdate {
                generation,
                request,
                quote,
            })
            .is_err()
        {
            return;
        }
        if closed {
            return;
        }
    }
}
