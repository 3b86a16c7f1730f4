//! Pure projections of the update stream and predicate constructors.
//!
//! Pipes narrow a raw [`Update`] stream to the event category an
//! application cares about; [`messageable`] is the projection the matcher
//! consumes. Predicates and [`Selector`]s build the acceptance conditions
//! scenarios expect with.

use std::sync::Arc;

use futures_util::{future, Stream, StreamExt};

use crate::events::{
    CallbackQuery, Document, IncomingMessage, InlineQuery, Messageable, Update, UserId,
};

/// Fresh incoming messages only.
pub fn incoming_messages<S>(updates: S) -> impl Stream<Item = IncomingMessage>
where
    S: Stream<Item = Update>,
{
    updates.filter_map(|update| {
        future::ready(match update {
            Update::Message(msg) => Some(msg),
            _ => None,
        })
    })
}

/// Edits of previously sent messages only.
pub fn edited_messages<S>(updates: S) -> impl Stream<Item = IncomingMessage>
where
    S: Stream<Item = Update>,
{
    updates.filter_map(|update| {
        future::ready(match update {
            Update::EditedMessage(msg) => Some(msg),
            _ => None,
        })
    })
}

/// Callback button presses only.
pub fn callback_queries<S>(updates: S) -> impl Stream<Item = CallbackQuery>
where
    S: Stream<Item = Update>,
{
    updates.filter_map(|update| {
        future::ready(match update {
            Update::CallbackQuery(cb) => Some(cb),
            _ => None,
        })
    })
}

/// Inline-mode queries only.
pub fn inline_queries<S>(updates: S) -> impl Stream<Item = InlineQuery>
where
    S: Stream<Item = Update>,
{
    updates.filter_map(|update| {
        future::ready(match update {
            Update::InlineQuery(iq) => Some(iq),
            _ => None,
        })
    })
}

/// The matcher's alphabet: incoming messages and callback presses, unified.
pub fn messageable<S>(updates: S) -> impl Stream<Item = Messageable>
where
    S: Stream<Item = Update>,
{
    updates.filter_map(|update| {
        future::ready(match update {
            Update::Message(msg) => Some(Messageable::Message(msg)),
            Update::CallbackQuery(cb) => Some(Messageable::Callback(cb)),
            _ => None,
        })
    })
}

/// Matches a message that is the bot command `name` (`/name`, optionally
/// with a `@botname` suffix and arguments).
pub fn command(name: impl Into<String>) -> impl Fn(&Messageable) -> bool + Clone + Send + Sync {
    let name = name.into();
    move |event| match event {
        Messageable::Message(msg) => msg.is_command(&name),
        Messageable::Callback(_) => false,
    }
}

/// Matches a message whose text contains `fragment`.
pub fn containing(fragment: impl Into<String>) -> impl Fn(&Messageable) -> bool + Clone + Send + Sync {
    let fragment = fragment.into();
    move |event| match event {
        Messageable::Message(msg) => msg
            .text
            .as_deref()
            .is_some_and(|text| text.contains(&fragment)),
        Messageable::Callback(_) => false,
    }
}

/// Matches any message carrying text.
#[must_use]
pub fn text_message(event: &Messageable) -> bool {
    matches!(event, Messageable::Message(msg) if msg.text.is_some())
}

/// Matches any message carrying a document.
#[must_use]
pub fn document_message(event: &Messageable) -> bool {
    matches!(event, Messageable::Message(msg) if msg.document.is_some())
}

/// Matches a callback press on the message with the given id.
pub fn callback(message_id: i64) -> impl Fn(&Messageable) -> bool + Clone + Send + Sync {
    move |event| match event {
        Messageable::Callback(cb) => cb.message_id == Some(message_id),
        Messageable::Message(_) => false,
    }
}

/// Matches any event produced by the given participant.
pub fn from_user(user: UserId) -> impl Fn(&Messageable) -> bool + Clone + Send + Sync {
    move |event| event.sender() == Some(user)
}

/// A partial projection of events: an acceptance predicate paired with the
/// projection applied after acceptance.
///
/// Splitting the two keeps the matcher free of exception-driven control
/// flow: `is_defined` decides whether an event is consumed, `project` runs
/// only on accepted events and must succeed for every event `is_defined`
/// accepts.
pub struct Selector<A> {
    is_defined: Arc<dyn Fn(&Messageable) -> bool + Send + Sync>,
    project: Arc<dyn Fn(&Messageable) -> Option<A> + Send + Sync>,
}

impl<A> Clone for Selector<A> {
    fn clone(&self) -> Self {
        Self {
            is_defined: self.is_defined.clone(),
            project: self.project.clone(),
        }
    }
}

impl<A> Selector<A> {
    /// Build a selector from its two halves.
    pub fn new<P, F>(is_defined: P, project: F) -> Self
    where
        P: Fn(&Messageable) -> bool + Send + Sync + 'static,
        F: Fn(&Messageable) -> Option<A> + Send + Sync + 'static,
    {
        Self {
            is_defined: Arc::new(is_defined),
            project: Arc::new(project),
        }
    }

    /// Whether the selector accepts this event.
    #[must_use]
    pub fn matches(&self, event: &Messageable) -> bool {
        (self.is_defined)(event)
    }

    /// Project an accepted event.
    #[must_use]
    pub fn project(&self, event: &Messageable) -> Option<A> {
        (self.project)(event)
    }
}

/// Selects the text of a text message.
#[must_use]
pub fn text() -> Selector<String> {
    Selector::new(text_message, |event| match event {
        Messageable::Message(msg) => msg.text.clone(),
        Messageable::Callback(_) => None,
    })
}

/// Selects the document of a document message.
#[must_use]
pub fn document() -> Selector<Document> {
    Selector::new(document_message, |event| match event {
        Messageable::Message(msg) => msg.document.clone(),
        Messageable::Callback(_) => None,
    })
}

/// Selects the argument tail of the bot command `name`.
#[must_use]
pub fn command_args(name: impl Into<String>) -> Selector<String> {
    let name = name.into();
    let accept = command(name.clone());
    Selector::new(accept, move |event| match event {
        Messageable::Message(msg) => msg.command_args(&name),
        Messageable::Callback(_) => None,
    })
}

/// Selects the payload of a callback press on the message with the given
/// id. Presses without a payload are not accepted.
#[must_use]
pub fn callback_payload(message_id: i64) -> Selector<String> {
    Selector::new(
        move |event: &Messageable| match event {
            Messageable::Callback(cb) => cb.message_id == Some(message_id) && cb.payload.is_some(),
            Messageable::Message(_) => false,
        },
        |event| match event {
            Messageable::Callback(cb) => cb.payload.clone(),
            Messageable::Message(_) => None,
        },
    )
}
