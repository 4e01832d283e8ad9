//! Request/reply correlation
//!
//! The pending-request table is owned by a single pump task. Everything else,
//! including transport callbacks running on transport-owned threads, talks to
//! it through an unbounded channel:
//!
//! ```text
//!   caller ──register──┐
//!   transport ack ─────┤                     ┌──────────────────────────┐
//!   inbound reply ─────┼──▶ mpsc queue ──▶   │ pump: req_id -> pending  │──▶ oneshot ──▶ caller
//!   delivery failure ──┤                     └──────────────────────────┘
//!   caller timeout ────┘
//! ```
//!
//! Each pending request moves through `Sent -> Delivered` and ends exactly
//! once, either replied or failed. Whatever arrives after the end is dropped.

use crate::error::{Result, TunnelError};
use meshproxy_types::{DestinationAddress, ReplyEnvelope, ReqId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Terminal outcome delivered to the caller
pub type ReplyResult = Result<ReplyEnvelope>;

/// Non-terminal state of a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Handed to the transport
    Sent,
    /// The transport reports the destination has the request
    Delivered,
}

struct PendingRequest {
    expected_source: DestinationAddress,
    completion: oneshot::Sender<ReplyResult>,
    state: RequestState,
    created_at: Instant,
}

enum Command {
    Register {
        req_id: Option<ReqId>,
        expected_source: DestinationAddress,
        completion: oneshot::Sender<ReplyResult>,
        ack: oneshot::Sender<Result<ReqId>>,
    },
    Delivered {
        req_id: ReqId,
    },
    Complete {
        req_id: ReqId,
        source: DestinationAddress,
        reply: ReplyEnvelope,
    },
    Fail {
        req_id: ReqId,
        error: TunnelError,
    },
    Withdraw {
        req_id: ReqId,
    },
    /// The caller dropped its [`PendingReply`] before an outcome
    Abandon {
        req_id: ReqId,
    },
    State {
        req_id: ReqId,
        ack: oneshot::Sender<Option<RequestState>>,
    },
    PendingCount {
        ack: oneshot::Sender<usize>,
    },
}

/// Handle to the pending-request table.
///
/// Cheap to clone. `complete`, `fail` and `mark_delivered` never block and
/// may be called from any thread.
#[derive(Clone)]
pub struct RequestCorrelator {
    commands: mpsc::UnboundedSender<Command>,
}

impl RequestCorrelator {
    /// Spawn the pump on the current tokio runtime
    pub fn new() -> Result<Self> {
        Self::spawn_inner(None)
    }

    /// Like [`new`](Self::new), additionally failing requests that stay
    /// pending longer than `ttl` with [`TunnelError::RequestTimeout`]
    pub fn with_pending_ttl(ttl: Duration) -> Result<Self> {
        Self::spawn_inner(Some(ttl))
    }

    fn spawn_inner(pending_ttl: Option<Duration>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| TunnelError::NoRuntime(e.to_string()))?;
        let (commands, rx) = mpsc::unbounded_channel();
        let pump = Pump {
            pending: HashMap::new(),
            rng: StdRng::from_entropy(),
            pending_ttl,
        };
        runtime.spawn(pump.run(rx));
        Ok(Self { commands })
    }

    /// Register a pending request expecting its reply from `expected_source`.
    ///
    /// With `req_id == None` a fresh token is generated that collides with
    /// no pending request. A caller-supplied token that is already pending
    /// is rejected.
    pub async fn register(
        &self,
        req_id: Option<ReqId>,
        expected_source: DestinationAddress,
    ) -> Result<PendingReply> {
        let (completion, receiver) = oneshot::channel();
        let (ack, ack_rx) = oneshot::channel();
        self.send(Command::Register {
            req_id,
            expected_source,
            completion,
            ack,
        })?;
        let req_id = ack_rx.await.map_err(|_| TunnelError::CorrelatorClosed)??;
        Ok(PendingReply {
            req_id,
            receiver,
            commands: self.commands.clone(),
            settled: false,
        })
    }

    /// Record the transport-level acknowledgement for `req_id`
    pub fn mark_delivered(&self, req_id: ReqId) {
        let _ = self.send(Command::Delivered { req_id });
    }

    /// Offer a reply received from `source`
    pub fn complete(&self, req_id: ReqId, source: DestinationAddress, reply: ReplyEnvelope) {
        let _ = self.send(Command::Complete {
            req_id,
            source,
            reply,
        });
    }

    /// Fail `req_id` if it is still pending
    pub fn fail(&self, req_id: ReqId, error: TunnelError) {
        let _ = self.send(Command::Fail { req_id, error });
    }

    /// Drop `req_id` without notifying anyone (the caller gave up)
    pub fn withdraw(&self, req_id: ReqId) {
        let _ = self.send(Command::Withdraw { req_id });
    }

    /// Current state of `req_id`, `None` once it has ended or if unknown
    pub async fn state(&self, req_id: &ReqId) -> Result<Option<RequestState>> {
        let (ack, ack_rx) = oneshot::channel();
        self.send(Command::State {
            req_id: req_id.clone(),
            ack,
        })?;
        ack_rx.await.map_err(|_| TunnelError::CorrelatorClosed)
    }

    /// Number of requests awaiting an outcome. Also acts as a barrier: every
    /// command queued before this call has been applied when it returns.
    pub async fn pending_count(&self) -> Result<usize> {
        let (ack, ack_rx) = oneshot::channel();
        self.send(Command::PendingCount { ack })?;
        ack_rx.await.map_err(|_| TunnelError::CorrelatorClosed)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| TunnelError::CorrelatorClosed)
    }
}

/// Completion handle for one registered request.
///
/// Dropping it before the outcome arrives withdraws the request.
#[derive(Debug)]
pub struct PendingReply {
    req_id: ReqId,
    receiver: oneshot::Receiver<ReplyResult>,
    commands: mpsc::UnboundedSender<Command>,
    settled: bool,
}

impl PendingReply {
    pub fn req_id(&self) -> &ReqId {
        &self.req_id
    }
}

impl Future for PendingReply {
    type Output = ReplyResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => return Poll::Pending,
        };
        self.settled = true;
        Poll::Ready(outcome.unwrap_or(Err(TunnelError::CorrelatorClosed)))
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Closing first lets the pump tell this entry apart from a later
        // registration reusing the same token
        self.receiver.close();
        let _ = self.commands.send(Command::Abandon {
            req_id: self.req_id.clone(),
        });
    }
}

struct Pump {
    pending: HashMap<ReqId, PendingRequest>,
    rng: StdRng,
    pending_ttl: Option<Duration>,
}

impl Pump {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let sweep_every = self
            .pending_ttl
            .map(|ttl| (ttl / 2).max(Duration::from_millis(100)))
            .unwrap_or(Duration::from_secs(3600));
        let mut sweep = tokio::time::interval(sweep_every);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                _ = sweep.tick(), if self.pending_ttl.is_some() => self.sweep(),
            }
        }

        debug!(abandoned = self.pending.len(), "Request correlator stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register {
                req_id,
                expected_source,
                completion,
                ack,
            } => {
                let result = self.insert(req_id, expected_source, completion);
                if let Ok(req_id) = &result {
                    debug!(req_id = %req_id, expected_source = %expected_source, "Registered pending request");
                }
                if let Err(Ok(req_id)) = ack.send(result) {
                    // Caller went away before learning its token
                    self.pending.remove(&req_id);
                }
            }
            Command::Delivered { req_id } => {
                if let Some(pending) = self.pending.get_mut(&req_id) {
                    pending.state = RequestState::Delivered;
                    debug!(req_id = %req_id, "Request delivered");
                }
            }
            Command::Complete {
                req_id,
                source,
                reply,
            } => self.complete(req_id, source, reply),
            Command::Fail { req_id, error } => {
                if let Some(pending) = self.pending.remove(&req_id) {
                    info!(req_id = %req_id, error = %error, "Failing pending request");
                    let _ = pending.completion.send(Err(error));
                }
            }
            Command::Withdraw { req_id } => {
                if self.pending.remove(&req_id).is_some() {
                    debug!(req_id = %req_id, "Pending request withdrawn");
                }
            }
            Command::Abandon { req_id } => {
                let abandoned = self
                    .pending
                    .get(&req_id)
                    .is_some_and(|pending| pending.completion.is_closed());
                if abandoned {
                    self.pending.remove(&req_id);
                    debug!(req_id = %req_id, "Pending request abandoned by caller");
                }
            }
            Command::State { req_id, ack } => {
                let _ = ack.send(self.pending.get(&req_id).map(|p| p.state));
            }
            Command::PendingCount { ack } => {
                let _ = ack.send(self.pending.len());
            }
        }
    }

    fn insert(
        &mut self,
        req_id: Option<ReqId>,
        expected_source: DestinationAddress,
        completion: oneshot::Sender<ReplyResult>,
    ) -> Result<ReqId> {
        let req_id = match req_id {
            Some(req_id) if self.pending.contains_key(&req_id) => {
                return Err(TunnelError::DuplicateRequestId(req_id.to_string()));
            }
            Some(req_id) => req_id,
            None => loop {
                let candidate = ReqId::random(&mut self.rng);
                if !self.pending.contains_key(&candidate) {
                    break candidate;
                }
            },
        };

        self.pending.insert(
            req_id.clone(),
            PendingRequest {
                expected_source,
                completion,
                state: RequestState::Sent,
                created_at: Instant::now(),
            },
        );
        Ok(req_id)
    }

    fn complete(&mut self, req_id: ReqId, source: DestinationAddress, reply: ReplyEnvelope) {
        let expected = match self.pending.get(&req_id) {
            Some(pending) => pending.expected_source,
            None => {
                let error = TunnelError::UnknownReply(req_id.to_string());
                debug!(source = %source, error = %error, "Discarding reply");
                return;
            }
        };

        if expected != source {
            // The entry stays pending: the genuine reply may still arrive
            let error = TunnelError::ProvenanceMismatch {
                req_id: req_id.to_string(),
                expected,
                actual: source,
            };
            warn!(error = %error, "Discarding reply");
            return;
        }

        if let Some(pending) = self.pending.remove(&req_id) {
            debug!(
                req_id = %req_id,
                elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                "Reply matched pending request"
            );
            if pending.completion.send(Ok(reply)).is_err() {
                debug!(req_id = %req_id, "Caller stopped waiting before the reply arrived");
            }
        }
    }

    fn sweep(&mut self) {
        let Some(ttl) = self.pending_ttl else {
            return;
        };
        let expired: Vec<ReqId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.created_at.elapsed() >= ttl)
            .map(|(req_id, _)| req_id.clone())
            .collect();

        for req_id in expired {
            if let Some(pending) = self.pending.remove(&req_id) {
                warn!(req_id = %req_id, ttl_secs = ttl.as_secs(), "Sweeping idle pending request");
                let _ = pending
                    .completion
                    .send(Err(TunnelError::RequestTimeout(req_id.to_string())));
            }
        }
    }
}
