mod common;
use common::*;

use colloquy::errors::ScenarioError;
use colloquy::pipes;
use colloquy::scenario::{Scenario, SessionEnd};

/// Run one session on a fixed input and return the matched value, if any.
async fn matched<A: Send + 'static>(
    scenario: &Scenario<A>,
    input: Vec<colloquy::events::Messageable>,
) -> Option<A> {
    let mut events = source(input);
    match scenario.run(&mut events).await {
        SessionEnd::Matched(value) => Some(value),
        _ => None,
    }
}

#[tokio::test]
async fn left_identity() {
    let f = |x: i32| Scenario::pure(x * 2);
    let lhs = Scenario::pure(21).flat_map(f);
    let rhs = f(21);
    assert_eq!(matched(&lhs, vec![]).await, Some(42));
    assert_eq!(matched(&rhs, vec![]).await, Some(42));
}

#[tokio::test]
async fn right_identity() {
    let m = Scenario::select(pipes::text());
    let lhs = m.clone().flat_map(Scenario::pure);
    let input = vec![msg(1, "hello")];
    assert_eq!(matched(&lhs, input.clone()).await.as_deref(), Some("hello"));
    assert_eq!(matched(&m, input).await.as_deref(), Some("hello"));
}

#[tokio::test]
async fn associativity() {
    // (m >>= f) >>= g  ≡  m >>= (x => f(x) >>= g), with f and g each
    // consuming one further event so sequencing actually matters.
    let f = |x: String| Scenario::select(pipes::text()).map(move |y| format!("{x},{y}"));
    let g = |x: String| Scenario::select(pipes::text()).map(move |y| format!("{x},{y}"));

    let m = Scenario::select(pipes::text());
    let lhs = m.clone().flat_map(f).flat_map(g);
    let rhs = m.flat_map(move |x| f(x).flat_map(g));

    let input = vec![msg(1, "a"), msg(1, "b"), msg(1, "c")];
    assert_eq!(matched(&lhs, input.clone()).await.as_deref(), Some("a,b,c"));
    assert_eq!(matched(&rhs, input).await.as_deref(), Some("a,b,c"));
}

#[tokio::test]
async fn map_is_flat_map_into_pure() {
    let mapped = Scenario::select(pipes::text()).map(|t| t.len());
    let bound = Scenario::select(pipes::text()).flat_map(|t: String| Scenario::pure(t.len()));
    let input = vec![msg(1, "four")];
    assert_eq!(matched(&mapped, input.clone()).await, Some(4));
    assert_eq!(matched(&bound, input).await, Some(4));
}

#[tokio::test]
async fn attempt_reifies_errors() {
    let failing: Scenario<i32> = Scenario::raise_error(ScenarioError::msg("nope"));
    assert_eq!(
        matched(&failing.attempt(), vec![]).await,
        Some(Err(ScenarioError::msg("nope")))
    );

    let fine = Scenario::pure(7);
    assert_eq!(matched(&fine.attempt(), vec![]).await, Some(Ok(7)));
}

#[tokio::test]
async fn pure_consumes_no_input() {
    let scenario = Scenario::pure("ready");
    let mut events = source(vec![msg(1, "untouched")]);
    assert!(matches!(
        scenario.run(&mut events).await,
        SessionEnd::Matched("ready")
    ));
    // The event is still there for a following session.
    let follow = Scenario::select(pipes::text());
    assert!(matches!(
        follow.run(&mut events).await,
        SessionEnd::Matched(text) if text == "untouched"
    ));
}

#[tokio::test]
async fn then_discards_first_value() {
    let scenario = Scenario::expect(pipes::command("start")).then(Scenario::select(pipes::text()));
    let input = vec![msg(1, "/start"), msg(1, "hello")];
    assert_eq!(matched(&scenario, input).await.as_deref(), Some("hello"));
}

#[tokio::test]
async fn zip_keeps_both_values() {
    let scenario = Scenario::select(pipes::text()).zip(Scenario::select(pipes::text()));
    let input = vec![msg(1, "first"), msg(1, "second")];
    assert_eq!(
        matched(&scenario, input).await,
        Some(("first".to_string(), "second".to_string()))
    );
}

// Property coverage: the laws hold for arbitrary seed values and text
// inputs, not just the hand-picked cases above.
mod properties {
    use super::*;
    use proptest::prelude::*;

    fn block_on<F: std::future::Future<Output = ()>>(fut: F) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(fut);
    }

    proptest! {
        #[test]
        fn prop_left_identity(a in any::<i32>(), k in any::<i32>()) {
            block_on(async move {
                let f = move |x: i32| Scenario::pure(x.wrapping_add(k));
                let lhs = matched(&Scenario::pure(a).flat_map(f), vec![]).await;
                let rhs = matched(&f(a), vec![]).await;
                assert_eq!(lhs, rhs);
            });
        }

        #[test]
        fn prop_right_identity(texts in proptest::collection::vec("[a-z]{1,8}", 1..4)) {
            block_on(async move {
                let input: Vec<_> = texts.iter().map(|t| msg(1, t)).collect();
                let m = Scenario::select(pipes::text());
                let lhs = matched(&m.clone().flat_map(Scenario::pure), input.clone()).await;
                let rhs = matched(&m, input).await;
                assert_eq!(lhs, rhs);
            });
        }

        #[test]
        fn prop_map_consistent_with_bind(text in "[a-z]{0,12}") {
            block_on(async move {
                let input = vec![msg(1, &text)];
                let mapped = matched(
                    &Scenario::select(pipes::text()).map(|t| t.len()),
                    input.clone(),
                )
                .await;
                let bound = matched(
                    &Scenario::select(pipes::text())
                        .flat_map(|t: String| Scenario::pure(t.len())),
                    input,
                )
                .await;
                assert_eq!(mapped, bound);
            });
        }
    }
}
