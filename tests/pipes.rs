mod common;
use common::*;

use colloquy::events::{
    CallbackQuery, ChatId, IncomingMessage, InlineQuery, Messageable, Update, UserId,
};
use colloquy::pipes;
use colloquy::sources::{StaticSource, UpdateSource};
use futures::StreamExt;

fn sample_updates() -> Vec<Update> {
    vec![
        Update::Message(IncomingMessage::text(ChatId(1), "hello")),
        Update::EditedMessage(IncomingMessage::text(ChatId(1), "hello, edited")),
        Update::CallbackQuery(CallbackQuery {
            id: "cb-1".to_string(),
            from: UserId(2),
            chat_id: ChatId(1),
            message_id: Some(10),
            payload: Some("ok".to_string()),
        }),
        Update::InlineQuery(InlineQuery {
            id: "iq-1".to_string(),
            from: UserId(2),
            query: "weather".to_string(),
        }),
        Update::Unsupported,
    ]
}

#[tokio::test]
async fn messageable_unifies_messages_and_callbacks() {
    let events: Vec<Messageable> =
        pipes::messageable(futures::stream::iter(sample_updates())).collect().await;
    assert_eq!(events.len(), 2);
    assert!(events[0].is_message());
    assert!(events[1].is_callback());
}

#[tokio::test]
async fn category_pipes_select_their_variant() {
    let incoming: Vec<_> =
        pipes::incoming_messages(futures::stream::iter(sample_updates())).collect().await;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].text.as_deref(), Some("hello"));

    let edited: Vec<_> =
        pipes::edited_messages(futures::stream::iter(sample_updates())).collect().await;
    assert_eq!(edited.len(), 1);
    assert_eq!(edited[0].text.as_deref(), Some("hello, edited"));

    let callbacks: Vec<_> =
        pipes::callback_queries(futures::stream::iter(sample_updates())).collect().await;
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].payload.as_deref(), Some("ok"));

    let inline: Vec<_> =
        pipes::inline_queries(futures::stream::iter(sample_updates())).collect().await;
    assert_eq!(inline.len(), 1);
    assert_eq!(inline[0].query, "weather");
}

#[test]
fn command_matches_exact_token_only() {
    let is_start = pipes::command("start");
    assert!(is_start(&msg(1, "/start")));
    assert!(is_start(&msg(1, "/start now")));
    assert!(is_start(&msg(1, "/start@my_bot")));
    assert!(!is_start(&msg(1, "/started")));
    assert!(!is_start(&msg(1, "start")));
    assert!(!is_start(&callback(1, 10, "/start")));
}

#[test]
fn containing_checks_message_text() {
    let has_cat = pipes::containing("cat");
    assert!(has_cat(&msg(1, "concatenate")));
    assert!(!has_cat(&msg(1, "dog")));
    assert!(!has_cat(&doc_msg(1, "file")));
}

#[test]
fn message_kind_predicates() {
    assert!(pipes::text_message(&msg(1, "hi")));
    assert!(!pipes::text_message(&doc_msg(1, "file")));
    assert!(pipes::document_message(&doc_msg(1, "file")));
    assert!(!pipes::document_message(&msg(1, "hi")));
}

#[test]
fn callback_predicate_keys_on_message_id() {
    let on_keyboard = pipes::callback(10);
    assert!(on_keyboard(&callback(1, 10, "ok")));
    assert!(!on_keyboard(&callback(1, 11, "ok")));
    assert!(!on_keyboard(&msg(1, "ok")));
}

#[test]
fn from_user_checks_sender() {
    let mine = pipes::from_user(UserId(3));
    assert!(mine(&callback(3, 10, "ok")));
    assert!(!mine(&msg(1, "anonymous")));
}

#[test]
fn text_selector_projects_accepted_events() {
    let selector = pipes::text();
    let event = msg(1, "payload");
    assert!(selector.matches(&event));
    assert_eq!(selector.project(&event).as_deref(), Some("payload"));
    assert!(!selector.matches(&doc_msg(1, "file")));
}

#[test]
fn command_args_selector_strips_the_command() {
    let selector = pipes::command_args("echo");
    let event = msg(1, "/echo one two");
    assert!(selector.matches(&event));
    assert_eq!(selector.project(&event).as_deref(), Some("one two"));
    assert!(!selector.matches(&msg(1, "/other one")));
}

#[test]
fn callback_payload_selector_requires_payload() {
    let selector = pipes::callback_payload(10);
    let event = callback(1, 10, "chosen");
    assert!(selector.matches(&event));
    assert_eq!(selector.project(&event).as_deref(), Some("chosen"));

    let no_payload = Messageable::Callback(CallbackQuery {
        id: "cb-2".to_string(),
        from: UserId(1),
        chat_id: ChatId(1),
        message_id: Some(10),
        payload: None,
    });
    assert!(!selector.matches(&no_payload));
}

#[tokio::test]
async fn static_source_replays_updates_in_order() {
    let updates = sample_updates();
    let source = StaticSource::new(updates.clone());
    let stream = source.updates().await.expect("static source is infallible");
    let replayed: Vec<Update> = stream.collect().await;
    assert_eq!(replayed, updates);
}

#[test]
fn updates_round_trip_through_serde() {
    for update in sample_updates() {
        let json = serde_json::to_string(&update).unwrap();
        let parsed: Update = serde_json::from_str(&json).unwrap();
        assert_eq!(update, parsed);
    }
}
