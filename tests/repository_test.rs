use std::time::Duration;

use bookclub_chat::chat::chat_models::ChatUser;
use bookclub_chat::chat::chat_repository::ChatRepository;
use bookclub_chat::realtime::ChatStore;
use uuid::Uuid;

fn user(nickname: &str) -> ChatUser {
    ChatUser {
        id: Uuid::new_v4(),
        nickname: nickname.to_string(),
        avatar_url: None,
    }
}

fn repo() -> ChatRepository {
    ChatRepository::new(ChatStore::new())
}

#[tokio::test]
async fn starting_a_conversation_creates_one_row_and_two_participants() {
    let repo = repo();
    let alice = user("alice");
    let bob = user("bob");

    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    assert!(!conversation.is_group);
    assert!(conversation.name.is_none());

    let participants = repo.get_participants(conversation.id).await.unwrap();
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().any(|p| p.user_id == alice.id));
    assert!(participants.iter().any(|p| p.user_id == bob.id));

    let alice_convs = repo.list_conversations_for_user(alice.id).await.unwrap();
    let bob_convs = repo.list_conversations_for_user(bob.id).await.unwrap();
    assert_eq!(alice_convs.len(), 1);
    assert_eq!(bob_convs.len(), 1);
    assert_eq!(alice_convs[0].id, conversation.id);
    assert_eq!(bob_convs[0].id, conversation.id);
}

#[tokio::test]
async fn direct_conversation_lookup_is_idempotent_either_way_around() {
    let repo = repo();
    let alice = user("alice");
    let bob = user("bob");

    let first = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();
    let second = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();
    let swapped = repo
        .get_or_create_direct_conversation(&bob, &alice)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.id, swapped.id);
    assert_eq!(repo.get_participants(first.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unread_counts_messages_after_read_marker_from_other_senders() {
    let repo = repo();
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    repo.send_message(conversation.id, &alice, "hello").await.unwrap();
    repo.send_message(conversation.id, &alice, "there").await.unwrap();

    // Bob has not looked yet; Alice's own messages never count for her.
    assert_eq!(repo.unread_count(conversation.id, bob.id).await.unwrap(), 2);
    assert_eq!(repo.unread_count(conversation.id, alice.id).await.unwrap(), 0);

    repo.mark_read(conversation.id, bob.id).await.unwrap();
    assert_eq!(repo.unread_count(conversation.id, bob.id).await.unwrap(), 0);
}

#[tokio::test]
async fn sending_bumps_activity_and_reorders_the_list() {
    let repo = repo();
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

    // Most recent creation first initially; a message to the older
    // conversation moves it back to the top.
    repo.send_message(with_bob.id, &bob, "did you finish chapter 3?")
        .await
        .unwrap();

    let conversations = repo.list_conversations_for_user(alice.id).await.unwrap();
    assert_eq!(conversations[0].id, with_bob.id);
    assert_eq!(conversations[1].id, with_carol.id);
}

#[tokio::test]
async fn message_content_is_trimmed_and_history_is_a_recency_window() {
    let repo = repo();
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    let message = repo
        .send_message(conversation.id, &alice, "  hello  ")
        .await
        .unwrap();
    assert_eq!(message.content, "hello");

    for i in 0..60 {
        repo.send_message(conversation.id, &alice, &format!("msg {}", i))
            .await
            .unwrap();
    }

    let window = repo.list_messages(conversation.id, 50).await.unwrap();
    assert_eq!(window.len(), 50);
    assert!(window.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    assert_eq!(window.last().unwrap().content, "msg 59");
}

#[tokio::test]
async fn listing_messages_of_unknown_conversation_is_not_found() {
    let repo = repo();
    assert!(repo.list_messages(Uuid::new_v4(), 50).await.is_err());
    assert!(repo.mark_read(Uuid::new_v4(), Uuid::new_v4()).await.is_err());
}

#[tokio::test]
async fn conversation_summaries_carry_preview_and_unread() {
    let repo = repo();
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    repo.send_message(conversation.id, &bob, "book club on friday?")
        .await
        .unwrap();

    let summaries = repo.conversation_summaries(&alice).await.unwrap();
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.display_name, "bob");
    assert_eq!(summary.unread_count, 1);
    assert_eq!(
        summary.last_message.as_ref().unwrap().content,
        "book club on friday?"
    );
    assert!(summary.avatar_url.contains("ui-avatars.com"));
}

#[tokio::test]
async fn stale_typing_indicators_expire_without_explicit_clear() {
    let store = ChatStore::with_typing_window(Duration::from_millis(30));
    let repo = ChatRepository::new(store);
    let alice = user("alice");
    let bob = user("bob");
    let conversation = repo
        .get_or_create_direct_conversation(&alice, &bob)
        .await
        .unwrap();

    repo.set_typing(conversation.id, &alice).await.unwrap();
    assert_eq!(repo.list_typing(conversation.id).await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(repo.list_typing(conversation.id).await.unwrap().is_empty());
}
