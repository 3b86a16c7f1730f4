//! The episode interpreter.
//!
//! [`run`] evaluates one [`Episode`] against an event source and reports how
//! the session ended as a [`Step`]. Evaluation is single-threaded per
//! session and linear in the input: once an event has been pulled from the
//! source it is never revisited, whether it matched, mismatched, or was
//! consumed by a cancellation predicate.
//!
//! # Per-variant semantics
//!
//! - `Pure` / `Eval` / `RaiseError` are terminal and consume no input;
//!   `Eval` awaits its effect first.
//! - `Next` pulls one event. A satisfied predicate yields `Matched`, an
//!   unsatisfied one yields `Mismatched`. An exhausted source cancels the
//!   session (`CancelReason::UpstreamClosed`).
//! - `Bind` threads the previous value into its continuation. A mismatch is
//!   transparent through `Bind` only while the bound prefix has matched
//!   zero events; after the first successful `Next`, the mismatch is
//!   flagged as mid-sequence (`at_start = false`) and only an enclosing
//!   `Tolerate` may resume it.
//! - `Protected` resumes a failure with its recovery continuation on the
//!   same remaining stream. Mismatch and cancellation pass through.
//! - `Tolerate` reports each offending event through `on_mismatch`, then
//!   restarts its inner episode while the retry budget lasts.
//! - `Cancellable` installs a guard consulted for every event pulled while
//!   its inner episode runs, *before* the event reaches any `Next`
//!   predicate. Guards nest outermost-first.
//! - `TimeLimited` installs a deadline (clamped by any enclosing deadline)
//!   counted from the moment it starts executing. The deadline bounds the
//!   wait in `Next` and is re-checked after every completed effect, so
//!   in-flight effects always run to completion and cancellation lands at
//!   the next suspension point.
//!
//! Effects are sequenced in evaluation order; the matcher never reorders or
//! overlaps them within a session.

use std::fmt;

use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};
use tokio::time::Instant;

use crate::episode::{Episode, EventEffect, EventPredicate, Value};
use crate::errors::ScenarioError;
use crate::events::Messageable;

/// Why a session was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A `Cancellable` guard consumed an event.
    Predicate,
    /// A `TimeLimited` deadline elapsed.
    Deadline,
    /// The input stream ended.
    UpstreamClosed,
}

/// Outcome of evaluating an episode.
pub enum Step {
    /// The episode produced a value.
    Matched(Value),
    /// An event did not satisfy the episode. `at_start` is `true` when the
    /// episode had matched nothing yet ("this episode did not start here")
    /// and `false` for a mismatch mid-sequence.
    Mismatched { event: Messageable, at_start: bool },
    /// A user error escaped every `Protected` scope.
    Failed(ScenarioError),
    /// The session was cancelled; not catchable from inside the episode.
    Cancelled(CancelReason),
}

impl Step {
    /// Short label for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Matched(_) => "matched",
            Step::Mismatched { .. } => "mismatched",
            Step::Failed(_) => "failed",
            Step::Cancelled(_) => "cancelled",
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Matched(_) => f.write_str("Matched(..)"),
            Step::Mismatched { event, at_start } => f
                .debug_struct("Mismatched")
                .field("event", event)
                .field("at_start", at_start)
                .finish(),
            Step::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
            Step::Cancelled(reason) => f.debug_tuple("Cancelled").field(reason).finish(),
        }
    }
}

/// An active cancellation scope.
struct Guard {
    cancel_when: EventPredicate,
    on_cancel: Option<EventEffect>,
}

/// Mutable evaluation state threaded through one session.
#[derive(Default)]
struct EvalCtx {
    /// Cancellation scopes, outermost first.
    guards: Vec<Guard>,
    /// Earliest active deadline, if any `TimeLimited` encloses the current
    /// position.
    deadline: Option<Instant>,
    /// Count of events successfully matched so far; `Bind` snapshots it to
    /// tell a first-step mismatch from a mid-sequence one.
    matched: u64,
}

impl EvalCtx {
    fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Evaluate one session of `episode` against `source`.
///
/// The source is taken by mutable reference: on return it is positioned
/// just past the input the session consumed, so a caller can drive the next
/// session on the remaining suffix.
pub async fn run<S>(episode: &Episode, source: &mut S) -> Step
where
    S: Stream<Item = Messageable> + Unpin + Send,
{
    let mut ctx = EvalCtx::default();
    let step = eval(episode, &mut ctx, source).await;
    tracing::debug!(
        target: "colloquy::matcher",
        outcome = step.kind(),
        events_matched = ctx.matched,
        "session ended"
    );
    step
}

fn eval<'a, S>(episode: &'a Episode, ctx: &'a mut EvalCtx, source: &'a mut S) -> BoxFuture<'a, Step>
where
    S: Stream<Item = Messageable> + Unpin + Send,
{
    Box::pin(async move {
        match episode {
            Episode::Pure(thunk) => Step::Matched(thunk()),

            Episode::RaiseError(error) => Step::Failed(error.clone()),

            Episode::Eval(effect) => {
                if ctx.deadline_expired() {
                    return Step::Cancelled(CancelReason::Deadline);
                }
                match effect().await {
                    Ok(value) => {
                        if ctx.deadline_expired() {
                            Step::Cancelled(CancelReason::Deadline)
                        } else {
                            Step::Matched(value)
                        }
                    }
                    Err(error) => Step::Failed(error),
                }
            }

            Episode::Next(predicate) => {
                let event = match next_event(ctx, source).await {
                    Ok(event) => event,
                    Err(step) => return step,
                };
                if predicate(&event) {
                    ctx.matched += 1;
                    Step::Matched(Box::new(event))
                } else {
                    Step::Mismatched {
                        event,
                        at_start: true,
                    }
                }
            }

            Episode::Bind { prev, cont } => {
                let before = ctx.matched;
                match eval(prev, ctx, source).await {
                    Step::Matched(value) => {
                        let next = cont(value);
                        // The continuation stamps its own local mismatches
                        // at_start; recombine against this bind's snapshot so
                        // a mismatch after the prefix matched is reported as
                        // mid-sequence.
                        match eval(&next, ctx, source).await {
                            Step::Mismatched { event, at_start } => Step::Mismatched {
                                event,
                                at_start: at_start && ctx.matched == before,
                            },
                            step => step,
                        }
                    }
                    Step::Mismatched { event, at_start } => Step::Mismatched {
                        event,
                        at_start: at_start && ctx.matched == before,
                    },
                    step => step,
                }
            }

            Episode::Map { prev, f } => match eval(prev, ctx, source).await {
                Step::Matched(value) => Step::Matched(f(value)),
                step => step,
            },

            Episode::Protected { inner, recover } => match eval(inner, ctx, source).await {
                Step::Failed(error) => {
                    let next = recover(error);
                    eval(&next, ctx, source).await
                }
                step => step,
            },

            Episode::Tolerate {
                inner,
                limit,
                on_mismatch,
            } => {
                let mut remaining = *limit;
                loop {
                    match eval(inner, ctx, source).await {
                        Step::Mismatched { event, at_start } => {
                            if let Err(error) = on_mismatch(event.clone()).await {
                                return Step::Failed(error);
                            }
                            if ctx.deadline_expired() {
                                return Step::Cancelled(CancelReason::Deadline);
                            }
                            match remaining {
                                None => {}
                                Some(0) => return Step::Mismatched { event, at_start },
                                Some(ref mut budget) => *budget -= 1,
                            }
                        }
                        step => return step,
                    }
                }
            }

            Episode::Cancellable {
                inner,
                cancel_when,
                on_cancel,
            } => {
                ctx.guards.push(Guard {
                    cancel_when: cancel_when.clone(),
                    on_cancel: on_cancel.clone(),
                });
                let step = eval(inner, ctx, source).await;
                ctx.guards.pop();
                step
            }

            Episode::TimeLimited { inner, duration } => {
                let deadline = Instant::now() + *duration;
                let saved = ctx.deadline;
                ctx.deadline = Some(saved.map_or(deadline, |d| d.min(deadline)));
                let step = eval(inner, ctx, source).await;
                ctx.deadline = saved;
                step
            }
        }
    })
}

/// Pull the next event, honoring the active deadline and cancellation
/// guards. A guard that fires consumes the event; it never reaches the
/// episode's own predicate.
async fn next_event<S>(ctx: &mut EvalCtx, source: &mut S) -> Result<Messageable, Step>
where
    S: Stream<Item = Messageable> + Unpin + Send,
{
    let event = match ctx.deadline {
        Some(deadline) => {
            let budget = deadline.saturating_duration_since(Instant::now());
            if budget.is_zero() {
                return Err(Step::Cancelled(CancelReason::Deadline));
            }
            match tokio::time::timeout(budget, source.next()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(Step::Cancelled(CancelReason::UpstreamClosed)),
                Err(_) => return Err(Step::Cancelled(CancelReason::Deadline)),
            }
        }
        None => match source.next().await {
            Some(event) => event,
            None => return Err(Step::Cancelled(CancelReason::UpstreamClosed)),
        },
    };

    let fired = ctx
        .guards
        .iter()
        .position(|guard| (guard.cancel_when)(&event));
    if let Some(index) = fired {
        let hook = ctx.guards[index].on_cancel.clone();
        if let Some(hook) = hook {
            if let Err(error) = hook(event).await {
                return Err(Step::Failed(error));
            }
        }
        return Err(Step::Cancelled(CancelReason::Predicate));
    }
    Ok(event)
}
