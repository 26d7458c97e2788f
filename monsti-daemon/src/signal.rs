//! Blocking publish/subscribe over request/response calls.
//!
//! Handler processes cannot be called back directly; they can only call the
//! daemon. A subscriber therefore parks a `WaitSignal` call, which returns
//! once a signal is delivered, and answers with `FinishSignal`. `Emit` walks
//! the subscribers of a signal in connection order and, for each one, waits
//! first for the delivery to be taken and then for the answer:
//!
//! ```text
//! emitter                      bus                         subscriber
//!   | emit("x") ------------->  | inbox.send(delivery)        |
//!   |                           |  <------------------------- | wait_signal()
//!   |                           |  pending = delivery.ret     |
//!   |                           |  ------------------------->  | (name, args, ticket)
//!   |                           |  <------------------------- | finish_signal(ret)
//!   | <- ret / next subscriber  |                             |
//! ```
//!
//! Waits have no timeout. While a response is outstanding a watchdog task
//! logs a reminder after a grace period and then at a fixed interval; it is
//! aborted as soon as the wait resolves or the emitter gives up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::error::DaemonError;
use crate::paths::{SIGNAL_GRACE, SIGNAL_REMINDER};

/// What a subscriber answers: a return value, or an error message that
/// aborts the emission.
pub type SignalReply = Result<Value, String>;

/// A signal handed to a subscriber by `WaitSignal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceivedSignal {
    pub name: String,
    pub args: Value,
    /// Identifies this delivery; may be echoed by `FinishSignal`.
    pub ticket: u64,
}

struct Delivery {
    ticket: u64,
    name: String,
    args: Value,
    taken: oneshot::Sender<()>,
    ret: oneshot::Sender<SignalReply>,
}

struct PendingReturn {
    ticket: u64,
    signal: String,
    ret: oneshot::Sender<SignalReply>,
}

/// Per-subscriber inbox. Capacity one: a second emission addressed to a busy
/// subscriber queues behind the first.
struct Subscriber {
    inbox_tx: mpsc::Sender<Delivery>,
    inbox_rx: Mutex<mpsc::Receiver<Delivery>>,
    pending: Mutex<Option<PendingReturn>>,
}

impl Subscriber {
    fn new() -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(1);
        Self {
            inbox_tx,
            inbox_rx: Mutex::new(inbox_rx),
            pending: Mutex::new(None),
        }
    }
}

#[derive(Default)]
struct SignalTables {
    /// Signal name -> subscriber ids in connection order.
    subscriptions: HashMap<String, Vec<String>>,
    subscribers: HashMap<String, Arc<Subscriber>>,
}

pub struct SignalBus {
    tables: RwLock<SignalTables>,
    next_ticket: AtomicU64,
    grace: Duration,
    reminder: Duration,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(SIGNAL_GRACE, SIGNAL_REMINDER)
    }
}

impl SignalBus {
    pub fn new(grace: Duration, reminder: Duration) -> Self {
        Self {
            tables: RwLock::new(SignalTables::default()),
            next_ticket: AtomicU64::new(0),
            grace,
            reminder,
        }
    }

    /// Subscribes `subscriber` to `signal`. Connecting twice is a no-op.
    pub async fn connect(&self, subscriber: &str, signal: &str) {
        let mut tables = self.tables.write().await;
        let ids = tables.subscriptions.entry(signal.to_owned()).or_default();
        if !ids.iter().any(|id| id == subscriber) {
            ids.push(subscriber.to_owned());
            tracing::info!(signal, subscriber, "subscriber connected");
        }
        tables
            .subscribers
            .entry(subscriber.to_owned())
            .or_insert_with(|| Arc::new(Subscriber::new()));
    }

    /// Subscriber ids of `signal` in notification order.
    pub async fn subscribers(&self, signal: &str) -> Vec<String> {
        let tables = self.tables.read().await;
        tables.subscriptions.get(signal).cloned().unwrap_or_default()
    }

    /// Delivers `signal` to each subscriber in turn and collects their
    /// answers in the same order.
    ///
    /// Stops at the first subscriber that answers with an error; later
    /// subscribers never see the signal.
    pub async fn emit(&self, signal: &str, args: Value) -> Result<Vec<Value>, DaemonError> {
        let targets: Vec<(String, Arc<Subscriber>)> = {
            let tables = self.tables.read().await;
            tables
                .subscriptions
                .get(signal)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| {
                            tables.subscribers.get(id).map(|s| (id.clone(), s.clone()))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        tracing::debug!(signal, subscribers = targets.len(), "emitting signal");

        let mut results = Vec::with_capacity(targets.len());
        for (id, subscriber) in targets {
            let reply = self.deliver(signal, &id, &subscriber, args.clone()).await?;
            match reply {
                Ok(value) => results.push(value),
                Err(message) => {
                    tracing::warn!(signal, subscriber = %id, error = %message, "signal subscriber failed");
                    return Err(DaemonError::SignalFailed {
                        signal: signal.to_owned(),
                        subscriber: id,
                        message,
                    });
                }
            }
        }
        Ok(results)
    }

    async fn deliver(
        &self,
        signal: &str,
        id: &str,
        subscriber: &Subscriber,
        args: Value,
    ) -> Result<SignalReply, DaemonError> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let (taken_tx, taken_rx) = oneshot::channel();
        let (ret_tx, ret_rx) = oneshot::channel();
        let abandoned = || DaemonError::SignalAbandoned {
            signal: signal.to_owned(),
            subscriber: id.to_owned(),
        };

        let watchdog = Watchdog::spawn(signal, id, self.grace, self.reminder);
        subscriber
            .inbox_tx
            .send(Delivery {
                ticket,
                name: signal.to_owned(),
                args,
                taken: taken_tx,
                ret: ret_tx,
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("signal inbox"))?;
        taken_rx.await.map_err(|_| abandoned())?;
        watchdog.mark_taken();
        let reply = ret_rx.await.map_err(|_| abandoned())?;
        Ok(reply)
    }

    /// Blocks until a signal is delivered to `subscriber`, then records that
    /// the subscriber owes a `finish` for it.
    ///
    /// If the subscriber still owed an answer for an earlier delivery, that
    /// delivery is abandoned and its emitter fails.
    pub async fn wait(&self, subscriber: &str) -> Result<ReceivedSignal, DaemonError> {
        let slot = self.subscriber(subscriber).await?;
        let (received, ret) = {
            let mut inbox = slot.inbox_rx.lock().await;
            loop {
                let Delivery {
                    ticket,
                    name,
                    args,
                    taken,
                    ret,
                } = inbox
                    .recv()
                    .await
                    .ok_or(DaemonError::ChannelClosed("signal inbox"))?;
                // The emitter gave up before anyone took the signal.
                if ret.is_closed() || taken.send(()).is_err() {
                    tracing::debug!(
                        subscriber,
                        signal = %name,
                        ticket,
                        "dropping signal whose emitter went away",
                    );
                    continue;
                }
                break (ReceivedSignal { name, args, ticket }, ret);
            }
        };

        let previous = slot.pending.lock().await.replace(PendingReturn {
            ticket: received.ticket,
            signal: received.name.clone(),
            ret,
        });
        if let Some(previous) = previous {
            tracing::warn!(
                subscriber,
                signal = %previous.signal,
                ticket = previous.ticket,
                "subscriber waited again before finishing; abandoning previous signal",
            );
        }

        tracing::debug!(subscriber, signal = %received.name, ticket = received.ticket, "signal taken");
        Ok(received)
    }

    /// Answers the signal most recently taken by `subscriber`.
    ///
    /// With `ticket` given, the answer is rejected unless it matches the
    /// outstanding delivery.
    pub async fn finish(
        &self,
        subscriber: &str,
        ticket: Option<u64>,
        reply: SignalReply,
    ) -> Result<(), DaemonError> {
        let slot = self.subscriber(subscriber).await?;
        let pending = {
            let mut guard = slot.pending.lock().await;
            match guard.take() {
                None => return Err(DaemonError::NoPendingSignal(subscriber.to_owned())),
                Some(pending) => match ticket {
                    Some(got) if got != pending.ticket => {
                        let expected = pending.ticket;
                        *guard = Some(pending);
                        return Err(DaemonError::StaleSignalTicket {
                            subscriber: subscriber.to_owned(),
                            expected,
                            got,
                        });
                    }
                    _ => pending,
                },
            }
        };

        if pending.ret.send(reply).is_err() {
            tracing::warn!(
                subscriber,
                signal = %pending.signal,
                "emitter went away before the signal was finished",
            );
        }
        Ok(())
    }

    async fn subscriber(&self, id: &str) -> Result<Arc<Subscriber>, DaemonError> {
        let tables = self.tables.read().await;
        tables
            .subscribers
            .get(id)
            .cloned()
            .ok_or_else(|| DaemonError::UnknownSubscriber(id.to_owned()))
    }
}

/// Logs while a signal response is outstanding. Aborted on drop.
struct Watchdog {
    handle: JoinHandle<()>,
    taken: Arc<AtomicBool>,
}

impl Watchdog {
    fn spawn(signal: &str, subscriber: &str, grace: Duration, reminder: Duration) -> Self {
        let taken = Arc::new(AtomicBool::new(false));
        let signal = signal.to_owned();
        let subscriber = subscriber.to_owned();
        let flag = taken.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut waited = grace;
            loop {
                let phase = if flag.load(Ordering::Relaxed) {
                    "finish"
                } else {
                    "wait"
                };
                tracing::warn!(
                    signal = %signal,
                    subscriber = %subscriber,
                    phase,
                    waited_secs = waited.as_secs(),
                    "waiting for signal response",
                );
                tokio::time::sleep(reminder).await;
                waited += reminder;
            }
        });
        Self { handle, taken }
    }

    fn mark_taken(&self) {
        self.taken.store(true, Ordering::Relaxed);
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
