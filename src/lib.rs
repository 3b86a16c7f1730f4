//! ```text
//! platform client ─► Update stream ─► pipes ─► Messageable stream
//!                                                  │
//!                                            Dispatcher (by ChatId)
//!                                                  │
//!                             ┌────────────────────┼────────────────────┐
//!                       conversation A       conversation B       conversation C
//!                             │                    │                    │
//!                          matcher ◄── Scenario / Episode IR ──► matcher
//!                             │                                        │
//!                             └──────────► merged output values ◄──────┘
//! ```
//!
//! Colloquy is a library for writing conversational bots as composable,
//! monadic state machines. A [`Scenario`](scenario::Scenario) describes a
//! multi-step interaction with one participant; the
//! [matcher](matcher) interprets it against an event stream with support
//! for effects, error recovery, retry-on-mismatch, cancellation, and time
//! limits; the [`Dispatcher`](dispatcher::Dispatcher) fans one shared
//! update stream out into independent per-conversation runs.

pub mod dispatcher;
pub mod episode;
pub mod errors;
pub mod events;
pub mod matcher;
pub mod pipes;
pub mod scenario;
pub mod sources;
