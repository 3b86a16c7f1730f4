//! The episode intermediate representation.
//!
//! An [`Episode`] is an immutable description of a multi-step interaction:
//! a small closed language of state-machine primitives the
//! [matcher](crate::matcher) interprets against an event stream. User code
//! never builds episodes directly; the typed [`Scenario`](crate::scenario::Scenario)
//! façade is the only constructor and keeps the erased values honest.
//!
//! Values flowing through an episode are erased to `Box<dyn Any + Send>`.
//! Leaves are re-runnable thunks and continuations are `Fn`, so a single
//! episode value can be evaluated any number of times.
//! [`Tolerate`](Episode::Tolerate) restarts rely on this, as does the
//! session-per-match driver loop.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::errors::ScenarioError;
use crate::events::Messageable;

/// An erased scenario value.
pub type Value = Box<dyn Any + Send>;

/// A re-runnable producer of a [`Value`]; backs [`Episode::Pure`].
pub type ValueThunk = Arc<dyn Fn() -> Value + Send + Sync>;

/// A running user effect yielding a value or a scenario error.
pub type EffectFuture = BoxFuture<'static, Result<Value, ScenarioError>>;

/// A re-runnable user effect; backs [`Episode::Eval`].
pub type Effect = Arc<dyn Fn() -> EffectFuture + Send + Sync>;

/// A monadic continuation: builds the next episode from the previous value.
pub type Cont = Arc<dyn Fn(Value) -> Episode + Send + Sync>;

/// A pure value transformation; backs [`Episode::Map`].
pub type Mapper = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Acceptance predicate over incoming events.
pub type EventPredicate = Arc<dyn Fn(&Messageable) -> bool + Send + Sync>;

/// A side effect fed with the event that triggered it (mismatch reports,
/// cancellation hooks).
pub type EventEffect =
    Arc<dyn Fn(Messageable) -> BoxFuture<'static, Result<(), ScenarioError>> + Send + Sync>;

/// Error-recovery continuation; backs [`Episode::Protected`].
pub type Recover = Arc<dyn Fn(ScenarioError) -> Episode + Send + Sync>;

/// The closed set of state-machine primitives.
///
/// Each variant holds strictly smaller sub-episodes or opaque user
/// functions; the tree is acyclic by construction. See
/// [`crate::matcher`] for the per-variant evaluation semantics.
#[derive(Clone)]
pub enum Episode {
    /// Succeed immediately with a value; consumes no input.
    Pure(ValueThunk),
    /// Run an effect and succeed with its result; consumes no input.
    Eval(Effect),
    /// Fail immediately; consumes no input.
    RaiseError(ScenarioError),
    /// Consume the next event; succeed with it if the predicate holds,
    /// otherwise mismatch.
    Next(EventPredicate),
    /// Sequential composition.
    Bind { prev: Box<Episode>, cont: Cont },
    /// Transform the result of an episode.
    Map { prev: Box<Episode>, f: Mapper },
    /// Error-recovery scope: failures of `inner` continue with `recover`
    /// on the same remaining stream. Mismatch and cancellation pass through.
    Protected { inner: Box<Episode>, recover: Recover },
    /// Restart `inner` on mismatch, reporting each offending event through
    /// `on_mismatch`, at most `limit` extra times (`None` = unbounded).
    Tolerate {
        inner: Box<Episode>,
        limit: Option<usize>,
        on_mismatch: EventEffect,
    },
    /// Observe every event flowing into `inner`; when `cancel_when` holds
    /// the event is consumed, `on_cancel` runs, and the episode terminates
    /// cancelled.
    Cancellable {
        inner: Box<Episode>,
        cancel_when: EventPredicate,
        on_cancel: Option<EventEffect>,
    },
    /// Impose a wall-clock bound on the evaluation of `inner`, counted from
    /// the moment the episode begins executing.
    TimeLimited { inner: Box<Episode>, duration: Duration },
}

impl Episode {
    /// Rewrite every effect in the tree through `transform`.
    ///
    /// Every variant has at most one direct sub-episode, so the tree is a
    /// unary spine: the walk descends it with an explicit frame stack and
    /// rebuilds bottom-up, keeping the call stack flat however long a
    /// `flat_map` chain the scenario was built from. Episodes produced by
    /// continuations (`Bind` and `Protected`) are rewritten at the moment
    /// the continuation runs.
    pub(crate) fn map_effects(&self, transform: &Arc<dyn EffectTransform>) -> Episode {
        enum Frame {
            Bind(Cont),
            Map(Mapper),
            Protected(Recover),
            Tolerate(Option<usize>, EventEffect),
            Cancellable(EventPredicate, Option<EventEffect>),
            TimeLimited(Duration),
        }

        let mut frames = Vec::new();
        let mut node = self;
        let mut rebuilt = loop {
            match node {
                Episode::Pure(thunk) => break Episode::Pure(thunk.clone()),
                Episode::RaiseError(error) => break Episode::RaiseError(error.clone()),
                Episode::Next(predicate) => break Episode::Next(predicate.clone()),
                Episode::Eval(effect) => {
                    let effect = effect.clone();
                    let transform = transform.clone();
                    break Episode::Eval(Arc::new(move || transform.transform(effect())));
                }
                Episode::Bind { prev, cont } => {
                    frames.push(Frame::Bind(cont.clone()));
                    node = prev.as_ref();
                }
                Episode::Map { prev, f } => {
                    frames.push(Frame::Map(f.clone()));
                    node = prev.as_ref();
                }
                Episode::Protected { inner, recover } => {
                    frames.push(Frame::Protected(recover.clone()));
                    node = inner.as_ref();
                }
                Episode::Tolerate {
                    inner,
                    limit,
                    on_mismatch,
                } => {
                    frames.push(Frame::Tolerate(*limit, on_mismatch.clone()));
                    node = inner.as_ref();
                }
                Episode::Cancellable {
                    inner,
                    cancel_when,
                    on_cancel,
                } => {
                    frames.push(Frame::Cancellable(cancel_when.clone(), on_cancel.clone()));
                    node = inner.as_ref();
                }
                Episode::TimeLimited { inner, duration } => {
                    frames.push(Frame::TimeLimited(*duration));
                    node = inner.as_ref();
                }
            }
        };

        while let Some(frame) = frames.pop() {
            rebuilt = match frame {
                Frame::Bind(cont) => {
                    let transform = transform.clone();
                    Episode::Bind {
                        prev: Box::new(rebuilt),
                        cont: Arc::new(move |value| cont(value).map_effects(&transform)),
                    }
                }
                Frame::Map(f) => Episode::Map {
                    prev: Box::new(rebuilt),
                    f,
                },
                Frame::Protected(recover) => {
                    let transform = transform.clone();
                    Episode::Protected {
                        inner: Box::new(rebuilt),
                        recover: Arc::new(move |error| recover(error).map_effects(&transform)),
                    }
                }
                Frame::Tolerate(limit, on_mismatch) => Episode::Tolerate {
                    inner: Box::new(rebuilt),
                    limit,
                    on_mismatch: wrap_event_effect(&on_mismatch, transform),
                },
                Frame::Cancellable(cancel_when, on_cancel) => Episode::Cancellable {
                    inner: Box::new(rebuilt),
                    cancel_when,
                    on_cancel: on_cancel
                        .as_ref()
                        .map(|effect| wrap_event_effect(effect, transform)),
                },
                Frame::TimeLimited(duration) => Episode::TimeLimited {
                    inner: Box::new(rebuilt),
                    duration,
                },
            };
        }
        rebuilt
    }
}

/// A natural transformation of the effect carrier.
///
/// Implementations wrap every effect future an episode runs (`eval`
/// bodies, mismatch reporters, cancellation hooks) and may add behavior
/// around them (tracing, timing, retries) as long as the wrapped future
/// still resolves to the inner result type.
///
/// Applied with [`Scenario::map_k`](crate::scenario::Scenario::map_k).
pub trait EffectTransform: Send + Sync {
    /// Wrap one effect future.
    fn transform(&self, effect: EffectFuture) -> EffectFuture;
}

/// Lift a unit event effect through the value-typed transform.
fn wrap_event_effect(effect: &EventEffect, transform: &Arc<dyn EffectTransform>) -> EventEffect {
    let effect = effect.clone();
    let transform = transform.clone();
    Arc::new(move |event| {
        let fut = effect(event);
        let lifted: EffectFuture =
            Box::pin(async move { fut.await.map(|()| Box::new(()) as Value) });
        let transformed = transform.transform(lifted);
        Box::pin(async move { transformed.await.map(|_| ()) })
    })
}

impl fmt::Debug for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Episode::Pure(_) => f.write_str("Pure"),
            Episode::Eval(_) => f.write_str("Eval"),
            Episode::RaiseError(error) => f.debug_tuple("RaiseError").field(error).finish(),
            Episode::Next(_) => f.write_str("Next"),
            Episode::Bind { prev, .. } => f.debug_struct("Bind").field("prev", prev).finish(),
            Episode::Map { prev, .. } => f.debug_struct("Map").field("prev", prev).finish(),
            Episode::Protected { inner, .. } => {
                f.debug_struct("Protected").field("inner", inner).finish()
            }
            Episode::Tolerate { inner, limit, .. } => f
                .debug_struct("Tolerate")
                .field("inner", inner)
                .field("limit", limit)
                .finish(),
            Episode::Cancellable { inner, .. } => {
                f.debug_struct("Cancellable").field("inner", inner).finish()
            }
            Episode::TimeLimited { inner, duration } => f
                .debug_struct("TimeLimited")
                .field("inner", inner)
                .field("duration", duration)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_renders_structure_without_closures() {
        let episode = Episode::Tolerate {
            inner: Box::new(Episode::Bind {
                prev: Box::new(Episode::Next(Arc::new(|_| true))),
                cont: Arc::new(|_| Episode::Pure(Arc::new(|| Box::new(()) as Value))),
            }),
            limit: Some(2),
            on_mismatch: Arc::new(|_| Box::pin(async { Ok(()) })),
        };
        let rendered = format!("{episode:?}");
        assert!(rendered.contains("Tolerate"));
        assert!(rendered.contains("Bind"));
        assert!(rendered.contains("Next"));
        assert!(rendered.contains("limit: Some(2)"));
    }

    #[test]
    fn episodes_are_cheaply_cloneable() {
        let episode = Episode::Next(Arc::new(|_| true));
        let copy = episode.clone();
        assert!(matches!(copy, Episode::Next(_)));
    }
}
