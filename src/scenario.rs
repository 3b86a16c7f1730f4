//! The user-facing combinator algebra.
//!
//! A [`Scenario<A>`] wraps an [`Episode`](crate::episode::Episode) and
//! carries the type of the value a successful run produces. Scenarios are
//! immutable, cheaply cloneable values built bottom-up from four
//! constructors ([`expect`](Scenario::expect), [`eval`](Scenario::eval),
//! [`pure`](Scenario::pure), [`raise_error`](Scenario::raise_error)) and
//! combined with the monadic operations plus error recovery, retry,
//! cancellation, and time limits.
//!
//! # Examples
//!
//! A two-step form: wait for a command, then take the next text message as
//! the answer:
//!
//! ```
//! use colloquy::pipes;
//! use colloquy::scenario::Scenario;
//!
//! let age = Scenario::expect(pipes::command("age"))
//!     .then(Scenario::select(pipes::text()))
//!     .map(|text| text.trim().to_string());
//! ```
//!
//! Running a scenario against a fixed input:
//!
//! ```
//! use colloquy::events::{ChatId, IncomingMessage, Messageable};
//! use colloquy::pipes;
//! use colloquy::scenario::{Scenario, SessionEnd};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let scenario = Scenario::expect(pipes::text_message);
//! let mut source = futures_util::stream::iter(vec![Messageable::Message(
//!     IncomingMessage::text(ChatId(1), "hello"),
//! )]);
//! match scenario.run(&mut source).await {
//!     SessionEnd::Matched(event) => assert_eq!(event.text(), Some("hello")),
//!     end => panic!("unexpected end: {end:?}"),
//! }
//! # }
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;

use crate::episode::{EffectTransform, Episode, Value};
use crate::errors::ScenarioError;
use crate::events::Messageable;
use crate::matcher::{self, CancelReason, Step};
use crate::pipes::Selector;

/// How one session of a scenario ended.
///
/// Only [`Matched`](SessionEnd::Matched) and [`Failed`](SessionEnd::Failed)
/// are meaningful to most applications; the remaining variants exist so
/// drivers (like the [dispatcher](crate::dispatcher)) can decide whether to
/// retry on the remaining input.
#[derive(Debug)]
pub enum SessionEnd<A> {
    /// The scenario completed and produced its value.
    Matched(A),
    /// An event did not satisfy the scenario. With `at_start` set the
    /// scenario never began (its first expectation refused the event);
    /// otherwise the mismatch happened mid-sequence outside any `tolerate`.
    Mismatched { event: Messageable, at_start: bool },
    /// An uncaught error surfaced.
    Failed(ScenarioError),
    /// The session was cancelled (`stop_on`/`stop_with` predicate, a
    /// `within` deadline, or the end of the input stream).
    Cancelled(CancelReason),
}

impl<A> SessionEnd<A> {
    /// Short label for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEnd::Matched(_) => "matched",
            SessionEnd::Mismatched { .. } => "mismatched",
            SessionEnd::Failed(_) => "failed",
            SessionEnd::Cancelled(_) => "cancelled",
        }
    }
}

/// A composable description of a multi-step interaction with one
/// participant, producing an `A` when it completes.
pub struct Scenario<A> {
    episode: Episode,
    _out: PhantomData<fn() -> A>,
}

impl<A> Clone for Scenario<A> {
    fn clone(&self) -> Self {
        Self {
            episode: self.episode.clone(),
            _out: PhantomData,
        }
    }
}

impl<A> std::fmt::Debug for Scenario<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Scenario").field(&self.episode).finish()
    }
}

/// Unwrap an erased value produced by a scenario of type `A`.
fn downcast<A: Send + 'static>(value: Value) -> A {
    // The typed facade is the only episode constructor, so the erased value
    // a continuation receives is always the type its scenario produced.
    *value
        .downcast::<A>()
        .expect("scenario value type invariant")
}

impl<A: Send + 'static> Scenario<A> {
    pub(crate) fn from_episode(episode: Episode) -> Self {
        Self {
            episode,
            _out: PhantomData,
        }
    }

    /// Succeed immediately with `value`, consuming no input.
    pub fn pure(value: A) -> Self
    where
        A: Clone + Sync,
    {
        Self::from_episode(Episode::Pure(Arc::new(move || {
            Box::new(value.clone()) as Value
        })))
    }

    /// Run an effect and succeed with its result, consuming no input.
    ///
    /// The closure is invoked once per evaluation; a scenario placed inside
    /// a `tolerate` may evaluate it several times.
    pub fn eval<F, Fut>(effect: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A, ScenarioError>> + Send + 'static,
    {
        Self::from_episode(Episode::Eval(Arc::new(move || {
            let fut = effect();
            Box::pin(async move { fut.await.map(|value| Box::new(value) as Value) })
        })))
    }

    /// Fail immediately with `error`, consuming no input.
    pub fn raise_error(error: ScenarioError) -> Self {
        Self::from_episode(Episode::RaiseError(error))
    }

    /// Consume the next matching event and project it through `selector`.
    ///
    /// The selector's `is_defined` decides acceptance exactly like
    /// [`expect`](Scenario::expect); its projection runs only after
    /// acceptance.
    pub fn select(selector: Selector<A>) -> Self
    where
        A: Clone + Sync,
    {
        let accept = selector.clone();
        Scenario::expect(move |event| accept.matches(event)).flat_map(move |event| {
            match selector.project(&event) {
                Some(value) => Scenario::pure(value),
                None => Scenario::raise_error(ScenarioError::SelectorProjection),
            }
        })
    }

    /// Sequential composition: feed this scenario's value into `f`.
    pub fn flat_map<B, F>(self, f: F) -> Scenario<B>
    where
        B: Send + 'static,
        F: Fn(A) -> Scenario<B> + Send + Sync + 'static,
    {
        Scenario::from_episode(Episode::Bind {
            prev: Box::new(self.episode),
            cont: Arc::new(move |value| f(downcast::<A>(value)).episode),
        })
    }

    /// Transform the produced value.
    pub fn map<B, F>(self, f: F) -> Scenario<B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        Scenario::from_episode(Episode::Map {
            prev: Box::new(self.episode),
            f: Arc::new(move |value| Box::new(f(downcast::<A>(value))) as Value),
        })
    }

    /// Sequence `next` after this scenario, discarding this scenario's
    /// value.
    pub fn then<B: Send + 'static>(self, next: Scenario<B>) -> Scenario<B> {
        let episode = next.episode;
        Scenario::from_episode(Episode::Bind {
            prev: Box::new(self.episode),
            cont: Arc::new(move |_| episode.clone()),
        })
    }

    /// Sequence `next` after this scenario, keeping both values.
    pub fn zip<B: Send + 'static>(self, next: Scenario<B>) -> Scenario<(A, B)>
    where
        A: Clone + Sync,
    {
        self.flat_map(move |a| next.clone().map(move |b| (a.clone(), b)))
    }

    /// Recover from an uncaught error with `recover`, continuing on the
    /// same remaining input. Mismatches and cancellation are not caught.
    pub fn handle_error_with<F>(self, recover: F) -> Self
    where
        F: Fn(ScenarioError) -> Scenario<A> + Send + Sync + 'static,
    {
        Scenario::from_episode(Episode::Protected {
            inner: Box::new(self.episode),
            recover: Arc::new(move |error| recover(error).episode),
        })
    }

    /// Reify the failure channel into the result value.
    ///
    /// `raise_error(e).attempt()` matches with `Err(e)`; `pure(a).attempt()`
    /// matches with `Ok(a)`.
    pub fn attempt(self) -> Scenario<Result<A, ScenarioError>> {
        let ok = Episode::Map {
            prev: Box::new(self.episode),
            f: Arc::new(|value| Box::new(Ok::<A, ScenarioError>(downcast::<A>(value))) as Value),
        };
        Scenario::from_episode(Episode::Protected {
            inner: Box::new(ok),
            recover: Arc::new(|error| {
                Episode::Pure(Arc::new(move || {
                    Box::new(Err::<A, ScenarioError>(error.clone())) as Value
                }))
            }),
        })
    }

    /// Retry once on mismatch, reporting the offending event.
    ///
    /// Equivalent to [`tolerate_n(1, ..)`](Scenario::tolerate_n).
    pub fn tolerate<F, Fut>(self, on_mismatch: F) -> Self
    where
        F: Fn(Messageable) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
    {
        self.tolerate_inner(Some(1), on_mismatch)
    }

    /// Retry up to `limit` times on mismatch, reporting each offending
    /// event through `on_mismatch` before restarting.
    pub fn tolerate_n<F, Fut>(self, limit: usize, on_mismatch: F) -> Self
    where
        F: Fn(Messageable) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
    {
        self.tolerate_inner(Some(limit), on_mismatch)
    }

    /// Retry on mismatch without bound.
    pub fn tolerate_all<F, Fut>(self, on_mismatch: F) -> Self
    where
        F: Fn(Messageable) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
    {
        self.tolerate_inner(None, on_mismatch)
    }

    fn tolerate_inner<F, Fut>(self, limit: Option<usize>, on_mismatch: F) -> Self
    where
        F: Fn(Messageable) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
    {
        Scenario::from_episode(Episode::Tolerate {
            inner: Box::new(self.episode),
            limit,
            on_mismatch: Arc::new(move |event| Box::pin(on_mismatch(event))),
        })
    }

    /// Cancel the session when an incoming event satisfies `cancel_when`.
    ///
    /// The predicate sees every event before the scenario's own
    /// expectations do; a firing predicate consumes the event.
    pub fn stop_on<P>(self, cancel_when: P) -> Self
    where
        P: Fn(&Messageable) -> bool + Send + Sync + 'static,
    {
        Scenario::from_episode(Episode::Cancellable {
            inner: Box::new(self.episode),
            cancel_when: Arc::new(cancel_when),
            on_cancel: None,
        })
    }

    /// Like [`stop_on`](Scenario::stop_on), additionally running
    /// `on_cancel` with the cancelling event.
    pub fn stop_with<P, F, Fut>(self, cancel_when: P, on_cancel: F) -> Self
    where
        P: Fn(&Messageable) -> bool + Send + Sync + 'static,
        F: Fn(Messageable) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
    {
        Scenario::from_episode(Episode::Cancellable {
            inner: Box::new(self.episode),
            cancel_when: Arc::new(cancel_when),
            on_cancel: Some(Arc::new(move |event| Box::pin(on_cancel(event)))),
        })
    }

    /// Bound the whole scenario by a wall-clock duration, counted from the
    /// moment it starts executing. On expiry the session ends cancelled.
    ///
    /// In-flight effects are not aborted; the deadline takes effect at the
    /// next suspension point.
    pub fn within(self, duration: Duration) -> Self {
        Scenario::from_episode(Episode::TimeLimited {
            inner: Box::new(self.episode),
            duration,
        })
    }

    /// Rewrite every effect in the scenario through `transform`.
    ///
    /// Useful for cross-cutting concerns (tracing, timing, retries)
    /// without touching the scenario's structure. The rewrite is applied
    /// lazily through continuations, so deep `flat_map` chains do not grow
    /// the walk.
    pub fn map_k(self, transform: impl EffectTransform + 'static) -> Self {
        let transform: Arc<dyn EffectTransform> = Arc::new(transform);
        Scenario::from_episode(self.episode.map_effects(&transform))
    }

    /// Evaluate one session against `source`.
    ///
    /// On return the source is positioned just past the consumed input, so
    /// callers can drive another session on the remaining suffix.
    pub async fn run<S>(&self, source: &mut S) -> SessionEnd<A>
    where
        S: Stream<Item = Messageable> + Unpin + Send,
    {
        match matcher::run(&self.episode, source).await {
            Step::Matched(value) => SessionEnd::Matched(downcast::<A>(value)),
            Step::Mismatched { event, at_start } => SessionEnd::Mismatched { event, at_start },
            Step::Failed(error) => SessionEnd::Failed(error),
            Step::Cancelled(reason) => SessionEnd::Cancelled(reason),
        }
    }

    /// Repeatedly run the scenario over `source`, emitting one value per
    /// successful session.
    ///
    /// Sessions that end without a match (mismatch, failure, cancellation)
    /// restart on the remaining input, provided they consumed at least one
    /// event; a session that ends empty-handed without touching the input
    /// would never progress, so it ends the stream instead. The stream also
    /// ends when the source is exhausted.
    pub fn outcomes<S>(self, source: S) -> impl Stream<Item = A>
    where
        S: Stream<Item = Messageable> + Unpin + Send,
    {
        let source = Counted {
            inner: source,
            pulled: 0,
        };
        futures_util::stream::unfold((self, source), |(scenario, mut source)| async move {
            loop {
                let before = source.pulled;
                match scenario.run(&mut source).await {
                    SessionEnd::Matched(value) => return Some((value, (scenario, source))),
                    SessionEnd::Cancelled(CancelReason::UpstreamClosed) => return None,
                    end => {
                        if source.pulled == before {
                            tracing::warn!(
                                target: "colloquy::matcher",
                                outcome = end.kind(),
                                "session ended without consuming input; ending outcome stream"
                            );
                            return None;
                        }
                        if let SessionEnd::Failed(error) = end {
                            tracing::warn!(
                                target: "colloquy::matcher",
                                %error,
                                "scenario failed; restarting on remaining input"
                            );
                        }
                    }
                }
            }
        })
    }
}

/// Stream wrapper counting how many events have been pulled, so drivers can
/// tell whether a session made progress.
struct Counted<S> {
    inner: S,
    pulled: u64,
}

impl<S: Stream<Item = Messageable> + Unpin> Stream for Counted<S> {
    type Item = Messageable;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let polled = std::pin::Pin::new(&mut self.inner).poll_next(cx);
        if let std::task::Poll::Ready(Some(_)) = &polled {
            self.pulled += 1;
        }
        polled
    }
}

impl Scenario<Messageable> {
    /// Consume the next event if `predicate` accepts it.
    ///
    /// A refused event is a *mismatch*, not an error: an enclosing
    /// [`tolerate`](Scenario::tolerate) may retry, and a mismatch on the
    /// very first expectation means the scenario simply did not start.
    pub fn expect<P>(predicate: P) -> Self
    where
        P: Fn(&Messageable) -> bool + Send + Sync + 'static,
    {
        Scenario::from_episode(Episode::Next(Arc::new(predicate)))
    }
}

impl Scenario<()> {
    /// The completed scenario: succeeds immediately with `()`.
    pub fn done() -> Self {
        Scenario::pure(())
    }
}
