use std::sync::{Arc, Mutex};

use colloquy::errors::ScenarioError;
use colloquy::events::{
    CallbackQuery, ChatId, Document, IncomingMessage, Messageable, UserId,
};

/// Text message in the given chat.
pub fn msg(chat: i64, text: &str) -> Messageable {
    Messageable::Message(IncomingMessage::text(ChatId(chat), text))
}

/// Document message in the given chat.
pub fn doc_msg(chat: i64, file_id: &str) -> Messageable {
    Messageable::Message(IncomingMessage::document(
        ChatId(chat),
        Document {
            file_id: file_id.to_string(),
            file_name: None,
        },
    ))
}

/// Callback press in the given chat.
pub fn callback(chat: i64, message_id: i64, payload: &str) -> Messageable {
    Messageable::Callback(CallbackQuery {
        id: format!("cb-{chat}-{message_id}"),
        from: UserId(chat),
        chat_id: ChatId(chat),
        message_id: Some(message_id),
        payload: Some(payload.to_string()),
    })
}

/// Fixed-input event source.
pub fn source(events: Vec<Messageable>) -> futures::stream::Iter<std::vec::IntoIter<Messageable>> {
    futures::stream::iter(events)
}

/// Records effect invocations so tests can assert ordering and counts.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Event effect for `tolerate`/`stop_with` hooks: records
    /// `"{tag}:{event text}"` and succeeds.
    pub fn reporter(
        &self,
        tag: &'static str,
    ) -> impl Fn(Messageable) -> futures::future::Ready<Result<(), ScenarioError>>
           + Clone
           + Send
           + Sync
           + 'static {
        let recorder = self.clone();
        move |event| {
            recorder.note(format!("{tag}:{}", event.text().unwrap_or("<none>")));
            futures::future::ready(Ok(()))
        }
    }
}
