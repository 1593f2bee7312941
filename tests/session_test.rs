use std::time::Duration;

use bookclub_chat::chat::chat_models::{ChatMessage, ChatUser};
use bookclub_chat::chat::chat_repository::ChatRepository;
use bookclub_chat::chat::chat_session::{debounce_elapsed, ChatSession};
use bookclub_chat::realtime::{ChatEvent, ChatStore};
use bookclub_chat::websocket::types::WsMessage;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

fn user(nickname: &str) -> ChatUser {
    ChatUser {
        id: Uuid::new_v4(),
        nickname: nickname.to_string(),
        avatar_url: None,
    }
}

fn session_for(
    user: &ChatUser,
    repo: &ChatRepository,
) -> (ChatSession, mpsc::UnboundedReceiver<WsMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChatSession::new(user.clone(), repo.clone(), tx), rx)
}

/// Pumps subscription events into the session until `done` holds, or
/// panics after a second. Events arrive on the store's channels, so the
/// session has to be polled for them like the connection loop would.
async fn pump_until(session: &mut ChatSession, done: impl Fn(&ChatSession) -> bool) {
    for _ in 0..32 {
        if done(session) {
            return;
        }
        let event = timeout(Duration::from_secs(1), session.next_event())
            .await
            .expect("no subscription event arrived");
        session.apply_event(event).await;
    }
    panic!("condition not reached after pumping events");
}

#[tokio::test]
async fn selecting_holds_exactly_one_subscription_pair() {
    let store = ChatStore::new();
    let repo = ChatRepository::new(store.clone());
    let alice = user("alice");
    let bob = user("bob");
    let carol = user("carol");

    let with_bob = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();
    let with_carol = repo
        .get_or_create_direct_conversation(&alice, &carol)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;

    // Switch back and forth a few times; the old conversation's channels
    // must be released before the new pair is opened.
    for _ in 0..4 {
        session.select_conversation(with_bob.id).await;
        assert_eq!(session.active_conversation_id(), Some(with_bob.id));
        assert_eq!(store.message_subscribers(with_bob.id), 1);
        assert_eq!(store.typing_subscribers(with_bob.id), 1);
        assert_eq!(store.message_subscribers(with_carol.id), 0);
        assert_eq!(store.typing_subscribers(with_carol.id), 0);

        session.select_conversation(with_carol.id).await;
        assert_eq!(store.message_subscribers(with_carol.id), 1);
        assert_eq!(store.typing_subscribers(with_carol.id), 1);
        assert_eq!(store.message_subscribers(with_bob.id), 0);
        assert_eq!(store.typing_subscribers(with_bob.id), 0);
    }

    session.clear_active_conversation().await;
    assert_eq!(session.active_conversation_id(), None);
    assert_eq!(store.message_subscribers(with_carol.id), 0);
    assert_eq!(store.typing_subscribers(with_carol.id), 0);
}

#[tokio::test]
async fn duplicate_subscription_delivery_is_rendered_once() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;
    session.select_conversation(conversation.id).await;

    let message = ChatMessage::new(conversation.id, bob.id, "bob", None, "hello");

    // At-least-once delivery: the same insert can be pushed twice.
    session
        .apply_event(ChatEvent::MessageInserted(message.clone()))
        .await;
    session
        .apply_event(ChatEvent::MessageInserted(message.clone()))
        .await;

    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].id, message.id);
}

#[tokio::test]
async fn blank_send_is_a_complete_noop() {
    let store = ChatStore::new();
    let repo = ChatRepository::new(store.clone());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;
    session.select_conversation(conversation.id).await;

    session.send_message("   \t  ").await;

    assert!(store.last_message(conversation.id).is_none());
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn selecting_a_conversation_clears_its_unread_count() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    // Two messages arrive while Bob is not viewing the conversation.
    repo.send_message(conversation.id, &alice, "hello").await.unwrap();
    repo.send_message(conversation.id, &alice, "there").await.unwrap();
    assert_eq!(repo.unread_count(conversation.id, bob.id).await.unwrap(), 2);

    let (mut session, _rx) = session_for(&bob, &repo);
    session.start().await;
    assert_eq!(session.conversations()[0].unread_count, 2);

    session.select_conversation(conversation.id).await;

    assert_eq!(repo.unread_count(conversation.id, bob.id).await.unwrap(), 0);
    assert_eq!(session.conversations()[0].unread_count, 0);
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn incoming_message_keeps_read_marker_current_while_viewing() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&bob, &repo);
    session.start().await;
    session.select_conversation(conversation.id).await;

    repo.send_message(conversation.id, &alice, "still reading?")
        .await
        .unwrap();

    pump_until(&mut session, |s| !s.messages().is_empty()).await;

    assert_eq!(session.messages()[0].content, "still reading?");
    // The conversation is on screen, so the marker followed the message.
    assert_eq!(repo.unread_count(conversation.id, bob.id).await.unwrap(), 0);
}

#[tokio::test]
async fn own_send_arrives_via_subscription_without_duplication() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;
    session.select_conversation(conversation.id).await;

    session.send_message("picked our next book").await;
    pump_until(&mut session, |s| !s.messages().is_empty()).await;

    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].sender_id, alice.id);

    // Preview in the summary list was updated optimistically.
    let summary = &session.conversations()[0];
    assert_eq!(
        summary.last_message.as_ref().unwrap().content,
        "picked our next book"
    );
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_debounces_after_idle() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;
    session.select_conversation(conversation.id).await;

    session.set_typing(true).await;
    assert_eq!(repo.list_typing(conversation.id).await.unwrap().len(), 1);
    assert!(session.typing_deadline().is_some());

    // Four seconds pass with no further keystrokes; the debounce fires
    // and the indicator is cleared without an explicit stop.
    tokio::time::advance(Duration::from_secs(4)).await;
    debounce_elapsed(session.typing_deadline()).await;
    session.typing_expired().await;

    assert!(session.typing_deadline().is_none());
    assert!(repo.list_typing(conversation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn sending_clears_typing_immediately() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;
    session.select_conversation(conversation.id).await;

    session.set_typing(true).await;
    session.send_message("hi").await;

    assert!(session.typing_deadline().is_none());
    assert!(repo.list_typing(conversation.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn typing_updates_exclude_the_viewer() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;
    session.select_conversation(conversation.id).await;

    // Both sides are typing; Alice only sees Bob.
    repo.set_typing(conversation.id, &alice).await.unwrap();
    repo.set_typing(conversation.id, &bob).await.unwrap();

    pump_until(&mut session, |s| !s.typing_users().is_empty()).await;

    assert_eq!(session.typing_users().len(), 1);
    assert_eq!(session.typing_users()[0].user_id, bob.id);
}

#[tokio::test]
async fn start_conversation_pushes_ready_event_and_refreshes_list() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");

    let (mut session, mut rx) = session_for(&alice, &repo);
    session.start().await;
    assert!(session.conversations().is_empty());

    let conversation_id = session.start_conversation(&bob).await.unwrap();
    assert_eq!(session.conversations().len(), 1);
    assert_eq!(session.conversations()[0].id, conversation_id);

    let mut saw_ready = false;
    while let Ok(message) = rx.try_recv() {
        if let WsMessage::ConversationReady { conversation_id: id } = message {
            assert_eq!(id, conversation_id);
            saw_ready = true;
        }
    }
    assert!(saw_ready);
}

#[tokio::test]
async fn stale_events_for_a_left_conversation_are_discarded() {
    let repo = ChatRepository::new(ChatStore::new());
    let alice = user("alice");
    let bob = user("bob");
    let carol = user("carol");

    let with_bob = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();
    let with_carol = repo
        .get_or_create_direct_conversation(&alice, &carol)
        .await
        .unwrap();

    let (mut session, _rx) = session_for(&alice, &repo);
    session.start().await;
    session.select_conversation(with_bob.id).await;
    session.select_conversation(with_carol.id).await;

    // A buffered event from the conversation we already left must not be
    // merged into the new one's state.
    let stale = ChatMessage::new(with_bob.id, bob.id, "bob", None, "too late");
    session.apply_event(ChatEvent::MessageInserted(stale)).await;

    assert!(session.messages().is_empty());
}
