//! Streaming relay: forwards completion fragments to the HTTP response body.
//!
//! A spawned pump task pulls from the upstream completion stream and pushes
//! each non-empty fragment into a channel of capacity one whose receiver is
//! the response body. The pump therefore never runs more than one fragment
//! ahead of the client.
//!
//! States: `Idle -> Streaming -> Closed(Completed | Failed | Cancelled)`.
//! - upstream ends            -> `Completed`
//! - upstream yields an error -> error is forwarded to the body, `Failed`
//! - body receiver dropped    -> upstream is dropped unread, `Cancelled`
//!
//! Every exit drops both the upstream stream (releasing its connection) and
//! the sender (ending the body).

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use rateprof_core::{CompletionError, CompletionStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub type BodyItem = Result<Bytes, CompletionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Streaming,
    Closed(CloseReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub state: RelayState,
    pub fragments: usize,
    pub bytes: usize,
}

#[derive(Debug)]
struct Relay {
    state: RelayState,
    fragments: usize,
    bytes: usize,
}

impl Relay {
    fn new() -> Self {
        Self {
            state: RelayState::Idle,
            fragments: 0,
            bytes: 0,
        }
    }

    fn begin(&mut self) {
        if self.state == RelayState::Idle {
            self.state = RelayState::Streaming;
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self.state, RelayState::Closed(_))
    }

    fn record(&mut self, len: usize) {
        debug_assert!(!self.is_closed(), "write after close");
        self.fragments += 1;
        self.bytes += len;
    }

    /// First close wins; closed is terminal.
    fn close(&mut self, reason: CloseReason) {
        if !self.is_closed() {
            self.state = RelayState::Closed(reason);
        }
    }

    fn outcome(&self) -> RelayOutcome {
        RelayOutcome {
            state: self.state,
            fragments: self.fragments,
            bytes: self.bytes,
        }
    }
}

enum Step {
    Upstream(Option<Result<String, CompletionError>>),
    Disconnected,
}

/// Drive `upstream` into `tx` until it ends, fails, or the receiver goes away.
pub async fn pump(mut upstream: CompletionStream, tx: mpsc::Sender<BodyItem>) -> RelayOutcome {
    let mut relay = Relay::new();
    relay.begin();

    while !relay.is_closed() {
        let step = tokio::select! {
            biased;
            _ = tx.closed() => Step::Disconnected,
            item = upstream.next() => Step::Upstream(item),
        };

        match step {
            Step::Disconnected => relay.close(CloseReason::Cancelled),
            Step::Upstream(None) => relay.close(CloseReason::Completed),
            Step::Upstream(Some(Ok(text))) => {
                if text.is_empty() {
                    continue;
                }
                let len = text.len();
                if tx.send(Ok(Bytes::from(text))).await.is_err() {
                    relay.close(CloseReason::Cancelled);
                } else {
                    relay.record(len);
                }
            }
            Step::Upstream(Some(Err(e))) => {
                tracing::error!(error = %e, "Completion stream failed mid-response");
                // Receiver may already be gone; either way the relay is done.
                let _ = tx.send(Err(e)).await;
                relay.close(CloseReason::Failed);
            }
        }
    }

    drop(upstream);
    drop(tx);

    let outcome = relay.outcome();
    match outcome.state {
        RelayState::Closed(CloseReason::Cancelled) => tracing::info!(
            fragments = outcome.fragments,
            bytes = outcome.bytes,
            "Client disconnected, upstream released"
        ),
        _ => tracing::info!(
            state = ?outcome.state,
            fragments = outcome.fragments,
            bytes = outcome.bytes,
            "Relay closed"
        ),
    }
    outcome
}

/// Spawn the pump in the current tracing span and return the body stream
/// together with the pump's handle.
pub fn spawn_relay(
    upstream: CompletionStream,
) -> (impl Stream<Item = BodyItem> + Send + 'static, JoinHandle<RelayOutcome>) {
    let (tx, rx) = mpsc::channel::<BodyItem>(1);
    let handle = tokio::spawn(pump(upstream, tx).in_current_span());
    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    (body, handle)
}
