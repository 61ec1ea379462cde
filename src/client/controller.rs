//! The chat form controller.
//!
//! One controller is bound per page view. Each submission renders the user
//! bubble synchronously, then relays the query on a spawned task and renders
//! the reply (or an error bubble) when it arrives.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bubble::Bubble;

use super::surface::ChatSurface;
use super::transport::ChatTransport;

/// Order in which bot bubbles are rendered when several turns overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyOrdering {
    /// Render each reply as soon as its response completes.
    #[default]
    Arrival,
    /// Hold replies back until every earlier turn has rendered.
    Submission,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A bot bubble with this text was produced.
    Answered(String),
    /// The exchange failed; an error bubble with this text was produced.
    Failed(String),
    /// The controller was torn down before the reply was rendered.
    Cancelled,
}

/// Bookkeeping for overlapping turns.
#[derive(Debug, Default)]
struct TurnLedger {
    /// Number handed to the next submission.
    next_turn: u64,
    /// Lowest turn not yet rendered (submission ordering only).
    next_to_render: u64,
    /// Settled turns waiting on an earlier one. `None` marks a turn with
    /// nothing to render.
    parked: BTreeMap<u64, Option<Bubble>>,
    /// Turns whose reply has been rendered or dropped.
    finished: u64,
}

impl TurnLedger {
    fn open(&mut self) -> u64 {
        let turn = self.next_turn;
        self.next_turn += 1;
        turn
    }

    /// Record the result of `turn` and return the bubbles now ready to render.
    fn settle(&mut self, turn: u64, bubble: Option<Bubble>, ordering: ReplyOrdering) -> Vec<Bubble> {
        match ordering {
            ReplyOrdering::Arrival => {
                self.finished += 1;
                bubble.into_iter().collect()
            }
            ReplyOrdering::Submission => {
                self.parked.insert(turn, bubble);
                let mut ready = Vec::new();
                while let Some(entry) = self.parked.remove(&self.next_to_render) {
                    self.next_to_render += 1;
                    self.finished += 1;
                    ready.extend(entry);
                }
                ready
            }
        }
    }

    fn in_flight(&self) -> usize {
        usize::try_from(self.next_turn - self.finished).unwrap_or(usize::MAX)
    }
}

/// Surface plus turn ledger, locked together so a bubble and the scroll that
/// follows it are never interleaved with another turn.
#[derive(Debug)]
struct Page<S> {
    surface: S,
    ledger: TurnLedger,
}

impl<S: ChatSurface> Page<S> {
    fn render(&mut self, bubble: Bubble) {
        self.surface.append_bubble(bubble);
        self.surface.scroll_to_end();
    }
}

fn lock<S>(page: &Mutex<Page<S>>) -> MutexGuard<'_, Page<S>> {
    page.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A submitted turn whose reply may still be in flight.
#[derive(Debug)]
pub struct PendingTurn {
    turn: u64,
    handle: JoinHandle<TurnOutcome>,
}

impl PendingTurn {
    /// Zero-based submission number of this turn.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Wait until the reply has been handled.
    ///
    /// Under [`ReplyOrdering::Submission`] a handled reply may still be
    /// parked behind an earlier turn.
    pub async fn finished(self) -> TurnOutcome {
        self.handle.await.unwrap_or(TurnOutcome::Cancelled)
    }
}

/// Binds a chat form to a transport and renders each turn into the surface.
pub struct ChatFormController<S, T> {
    page: Arc<Mutex<Page<S>>>,
    transport: Arc<T>,
    ordering: ReplyOrdering,
    shutdown: CancellationToken,
}

impl<S, T> std::fmt::Debug for ChatFormController<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatFormController")
            .field("ordering", &self.ordering)
            .field("torn_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl<S: ChatSurface, T: ChatTransport> ChatFormController<S, T> {
    /// Bind to `surface`. Returns `None` when the surface has no chat form.
    pub fn bind(surface: S, transport: T, ordering: ReplyOrdering) -> Option<Self> {
        Self::bind_shared(surface, Arc::new(transport), ordering)
    }

    /// Like [`bind`](Self::bind) but with a transport shared across pages.
    pub fn bind_shared(surface: S, transport: Arc<T>, ordering: ReplyOrdering) -> Option<Self> {
        if !surface.has_form() {
            tracing::debug!(name: "chat.bind.skipped", "No chat form on page");
            return None;
        }

        Some(Self {
            page: Arc::new(Mutex::new(Page {
                surface,
                ledger: TurnLedger::default(),
            })),
            transport,
            ordering,
            shutdown: CancellationToken::new(),
        })
    }

    /// Handle a form submission.
    ///
    /// Returns `None` without touching the surface or the network when the
    /// query field is empty or the controller has been torn down. Otherwise
    /// the user bubble is already rendered when this returns, and the reply
    /// is rendered by a spawned task. Must be called within a tokio runtime.
    pub fn submit(&self) -> Option<PendingTurn> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let (turn, query) = {
            let mut page = lock(&self.page);
            let query = page.surface.query_value();
            if query.is_empty() {
                return None;
            }
            page.surface.append_bubble(Bubble::user(query.clone()));
            page.surface.clear_query();
            page.surface.scroll_to_end();
            (page.ledger.open(), query)
        };

        tracing::info!(name: "chat.turn.submitted", turn, "Chat query submitted");

        let shared = Arc::clone(&self.page);
        let transport = Arc::clone(&self.transport);
        let shutdown = self.shutdown.clone();
        let ordering = self.ordering;

        let handle = tokio::spawn(async move {
            let asked = AssertUnwindSafe(transport.ask(&query)).catch_unwind();
            let result = tokio::select! {
                () = shutdown.cancelled() => None,
                result = asked => Some(result),
            };

            let mut page = lock(&shared);
            let result = match result {
                Some(result) if !shutdown.is_cancelled() => result,
                _ => {
                    // Replies parked behind this turn are dropped with it.
                    page.ledger.settle(turn, None, ordering);
                    tracing::debug!(name: "chat.turn.cancelled", turn, "Chat turn cancelled");
                    return TurnOutcome::Cancelled;
                }
            };

            let (bubble, outcome) = match result {
                Ok(Ok(answer)) => {
                    tracing::info!(name: "chat.turn.answered", turn, "Chat reply received");
                    let outcome = TurnOutcome::Answered(answer.text.clone());
                    (Bubble::bot(answer.text), outcome)
                }
                Ok(Err(e)) => {
                    tracing::warn!(name: "chat.turn.failed", turn, error = %e, "Chat request failed");
                    let text = format!("Request failed: {e}");
                    (Bubble::error(text.clone()), TurnOutcome::Failed(text))
                }
                Err(_) => {
                    tracing::error!(name: "chat.turn.panicked", turn, "Chat transport panicked");
                    let text = "Request failed: transport panicked".to_string();
                    (Bubble::error(text.clone()), TurnOutcome::Failed(text))
                }
            };

            for ready in page.ledger.settle(turn, Some(bubble), ordering) {
                page.render(ready);
            }
            outcome
        });

        Some(PendingTurn { turn, handle })
    }

    /// Tear the controller down: cancel in-flight turns and ignore further
    /// submissions. Cancelled turns render nothing.
    pub fn teardown(&self) {
        tracing::debug!(name: "chat.controller.teardown", in_flight = self.turns_in_flight(), "Tearing down chat controller");
        self.shutdown.cancel();
    }

    /// Number of submitted turns whose reply has not been rendered yet.
    pub fn turns_in_flight(&self) -> usize {
        lock(&self.page).ledger.in_flight()
    }

    /// Reply ordering this controller was bound with.
    pub fn ordering(&self) -> ReplyOrdering {
        self.ordering
    }

    /// Inspect the surface.
    pub fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.page).surface)
    }

    /// Mutate the surface, e.g. to type into the query field.
    pub fn with_surface_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.page).surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_ordering_renders_immediately() {
        let mut ledger = TurnLedger::default();
        let a = ledger.open();
        let b = ledger.open();
        assert_eq!(ledger.in_flight(), 2);

        let ready = ledger.settle(b, Some(Bubble::bot("b")), ReplyOrdering::Arrival);
        assert_eq!(ready, vec![Bubble::bot("b")]);
        let ready = ledger.settle(a, Some(Bubble::bot("a")), ReplyOrdering::Arrival);
        assert_eq!(ready, vec![Bubble::bot("a")]);
        assert_eq!(ledger.in_flight(), 0);
    }

    #[test]
    fn test_submission_ordering_parks_late_turns() {
        let mut ledger = TurnLedger::default();
        let a = ledger.open();
        let b = ledger.open();
        let c = ledger.open();

        assert!(ledger.settle(c, Some(Bubble::bot("c")), ReplyOrdering::Submission).is_empty());
        assert!(ledger.settle(b, Some(Bubble::bot("b")), ReplyOrdering::Submission).is_empty());
        assert_eq!(ledger.in_flight(), 3);

        let ready = ledger.settle(a, Some(Bubble::bot("a")), ReplyOrdering::Submission);
        assert_eq!(
            ready,
            vec![Bubble::bot("a"), Bubble::bot("b"), Bubble::bot("c")]
        );
        assert_eq!(ledger.in_flight(), 0);
    }

    #[test]
    fn test_submission_ordering_skips_dropped_turns() {
        let mut ledger = TurnLedger::default();
        let a = ledger.open();
        let b = ledger.open();

        assert!(ledger.settle(b, Some(Bubble::bot("b")), ReplyOrdering::Submission).is_empty());
        let ready = ledger.settle(a, None, ReplyOrdering::Submission);
        assert_eq!(ready, vec![Bubble::bot("b")]);
    }

    #[test]
    fn test_ordering_deserializes_lowercase() {
        let ordering: ReplyOrdering = serde_json::from_str(r#""submission""#).unwrap();
        assert_eq!(ordering, ReplyOrdering::Submission);
    }
}
