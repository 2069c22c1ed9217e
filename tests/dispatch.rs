mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use questroom::errors::ClientError;
use questroom::room::{
    start_sync, ChoiceKey, EventKind, InteractionDispatcher, SyncHandle, SyncState, SyncUpdate,
    BROADCAST_TARGET,
};
use questroom::session::SessionContext;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

const FOLLOWUP: Duration = Duration::from_millis(30);

struct Room {
    api: Arc<FakeApi>,
    sync: SyncHandle,
    dispatcher: InteractionDispatcher<FakeApi>,
    updates: mpsc::UnboundedReceiver<SyncUpdate>,
}

async fn open_room(api: FakeApi, session: Arc<SessionContext>) -> Room {
    let api = Arc::new(api);
    let (tx, mut updates) = mpsc::unbounded_channel();
    let sync = start_sync(
        api.clone(),
        session.clone(),
        "ROOM42".into(),
        SyncState::new("alice", NARRATOR),
        Duration::from_secs(60),
        tx,
    );
    // wait for the immediate first cycle
    let _ = recv_within(&mut updates).await;
    let dispatcher = InteractionDispatcher::new(api.clone(), session, "ROOM42", sync.clone(), FOLLOWUP);
    Room {
        api,
        sync,
        dispatcher,
        updates,
    }
}

fn prompt_batch() -> questroom::room::PollBatch {
    batch(
        vec![ev(
            "q1",
            NARRATOR,
            "@alice The bridge creaks.\nA) Run across\nB) Climb down\nC) Turn back",
            10.0,
        )],
        &["alice", "bob"],
    )
}

#[tokio::test]
async fn blank_interaction_makes_no_network_call() {
    let room = open_room(FakeApi::new(), logged_in().await).await;
    let before = room.api.calls().len();

    let err = room.dispatcher.send_interaction("  ", "wave").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    let err = room.dispatcher.send_interaction("bob", "   ").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_err!(room.dispatcher.say("", None).await);

    assert_eq!(room.api.calls().len(), before);
    room.sync.shutdown().await;
}

#[tokio::test]
async fn interaction_submits_then_syncs_then_prompts_narrator() {
    let room = open_room(FakeApi::new(), logged_in().await).await;

    assert_ok!(room.dispatcher.send_interaction("bob", "hands over the map").await);

    let calls = room.api.calls();
    let tail: Vec<&str> = calls[calls.len() - 3..].to_vec();
    assert_eq!(tail, vec!["submit", "poll", "provoke"]);
    {
        let st = room.api.state();
        assert_eq!(st.submissions.len(), 1);
        assert_eq!(st.submissions[0].kind, EventKind::Interaction);
        assert_eq!(st.submissions[0].target.as_deref(), Some("bob"));
        assert_eq!(st.prompts[0].target, "bob");
        assert_eq!(st.prompts[0].original_sender, "alice");
        assert_eq!(st.prompts[0].prompt, "alice says to bob: hands over the map");
    }

    // the follow-up cycle picks up the narrator's reply
    let polls = room.api.count("poll");
    tokio::time::sleep(FOLLOWUP * 4).await;
    assert_eq!(room.api.count("poll"), polls + 1);
    room.sync.shutdown().await;
}

#[tokio::test]
async fn narrator_failure_does_not_fail_interaction() {
    let api = FakeApi::new();
    api.state().fail_provoke = true;
    let room = open_room(api, logged_in().await).await;

    assert_ok!(room.dispatcher.send_interaction("bob", "waves").await);
    assert_eq!(room.api.state().submissions.len(), 1);
    assert_eq!(room.api.count("provoke"), 1);
    room.sync.shutdown().await;
}

#[tokio::test]
async fn failed_submission_skips_narrator() {
    let api = FakeApi::new();
    api.state().fail_submit = true;
    let room = open_room(api, logged_in().await).await;

    let err = room.dispatcher.send_interaction("bob", "waves").await.unwrap_err();
    assert!(matches!(err, ClientError::Api(_)));
    assert_eq!(room.api.count("provoke"), 0);
    room.sync.shutdown().await;
}

#[tokio::test]
async fn choice_is_sent_once_and_broadcast() {
    let api = FakeApi::new();
    api.script_poll(prompt_batch());
    let mut room = open_room(api, logged_in().await).await;
    assert!(matches!(room.updates.try_recv(), Ok(SyncUpdate::Participants(_))));

    let phrase = room.dispatcher.select_choice("q1", ChoiceKey::B).await.expect("choice sent");
    assert_eq!(phrase, "I choose B: Climb down");
    {
        let st = room.api.state();
        assert_eq!(st.submissions.len(), 1);
        assert_eq!(st.submissions[0].kind, EventKind::Chat);
        assert_eq!(st.submissions[0].content, phrase);
        assert_eq!(st.prompts[0].target, BROADCAST_TARGET);
        assert_eq!(st.prompts[0].original_sender, "alice");
        let prompt = &st.prompts[0].prompt;
        assert!(prompt.starts_with("alice made a choice: I choose B: Climb down."), "{}", prompt);
        assert!(prompt.contains("\"alice\""));
    }

    let again = room.dispatcher.select_choice("q1", ChoiceKey::A).await;
    assert!(matches!(again, Err(ClientError::Validation(_))));
    assert_eq!(room.api.state().submissions.len(), 1);

    let snap = room.sync.snapshot().await.expect("snapshot");
    let set = snap.log[0].choices.as_ref().expect("choice set");
    assert!(!set.is_open());
    room.sync.shutdown().await;
}

#[tokio::test]
async fn failed_choice_submission_reopens_options() {
    let api = FakeApi::new();
    api.script_poll(prompt_batch());
    api.state().fail_submit = true;
    let room = open_room(api, logged_in().await).await;

    assert_err!(room.dispatcher.select_choice("q1", ChoiceKey::A).await);
    let snap = room.sync.snapshot().await.expect("snapshot");
    assert!(snap.log[0].choices.as_ref().expect("choice set").is_open());

    room.api.state().fail_submit = false;
    assert_ok!(room.dispatcher.select_choice("q1", ChoiceKey::A).await);
    room.sync.shutdown().await;
}

#[tokio::test]
async fn dispatch_without_session_is_rejected() {
    let session = logged_in().await;
    let room = open_room(FakeApi::new(), session.clone()).await;
    session.teardown("test").await;

    let err = room.dispatcher.say("hello", None).await.unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated));
    assert_eq!(room.api.count("submit"), 0);
    room.sync.shutdown().await;
}
