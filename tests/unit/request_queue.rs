//! Unit tests for the request queue through its public API

use std::time::Duration;
use stash_fetcher::service::{Action, RejectionSink, RequestQueue};
use stash_fetcher::Rejection;

#[test]
fn test_signals_jump_ahead_of_calls() {
    let queue = RequestQueue::new();
    queue.enqueue(["a", "b"]);
    queue.enqueue_shutdown();
    queue.enqueue_rejection(Rejection::new(vec![], Duration::from_secs(1)));
    queue.halt("stop".into());

    assert!(matches!(queue.try_dequeue(), Some(Action::Halt(_))));
    assert!(matches!(queue.try_dequeue(), Some(Action::Rejection(_))));
    assert_eq!(queue.try_dequeue(), Some(Action::Call("a")));
    assert_eq!(queue.try_dequeue(), Some(Action::Call("b")));
    assert_eq!(queue.try_dequeue(), Some(Action::Shutdown));
    assert_eq!(queue.try_dequeue(), None);
}

#[test]
fn test_requeued_call_is_served_next() {
    let queue = RequestQueue::new();
    queue.enqueue([1, 2, 3]);

    assert_eq!(queue.try_dequeue(), Some(Action::Call(1)));
    assert_eq!(queue.try_dequeue(), Some(Action::Call(2)));
    assert!(queue.requeue_last_call());

    assert_eq!(queue.try_dequeue(), Some(Action::Call(2)));
    assert_eq!(queue.try_dequeue(), Some(Action::Call(3)));
}

#[tokio::test]
async fn test_dequeue_wakes_on_enqueue() {
    let queue = std::sync::Arc::new(RequestQueue::new());
    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.dequeue().await })
    };

    tokio::task::yield_now().await;
    queue.enqueue(["late"]);

    assert_eq!(consumer.await.unwrap(), Action::Call("late"));
}
