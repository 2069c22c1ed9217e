mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use questroom::battle::{ActionOutcome, BattlePhase, BattleUpdate, PlayerAction, Resolution, Turn};
use questroom::client::{ClientEvent, GameClient};
use questroom::errors::ClientError;
use rand::rngs::StdRng;
use rand::SeedableRng;

async fn client_with(api: FakeApi) -> (GameClient<FakeApi>, Arc<FakeApi>) {
    let api = Arc::new(api);
    let client = GameClient::with_session(test_config(), api.clone(), logged_in().await);
    (client, api)
}

async fn next(client: &mut GameClient<FakeApi>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), client.next_event())
        .await
        .expect("timed out waiting for client event")
        .expect("client closed")
}

/// Play `action` on every player turn until the battle view closes.
async fn play_out(client: &mut GameClient<FakeApi>, action: PlayerAction) -> Vec<BattleUpdate> {
    let mut seen = Vec::new();
    loop {
        let ClientEvent::Battle(update) = next(client).await else {
            continue;
        };
        if let BattleUpdate::Vitals(view) = &update {
            if view.phase == BattlePhase::InBattle(Turn::Player) {
                let outcome = client.battle_action(action).await.expect("battle running");
                assert_ne!(outcome, ActionOutcome::Rejected);
            }
        }
        let done = matches!(update, BattleUpdate::ReturnToAmbient);
        seen.push(update);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn victory_awards_reward_exactly_once() {
    let (mut client, api) = client_with(FakeApi::new()).await;
    client
        .start_encounter_with(opponent("Forest Goblin", 30, 1), StdRng::seed_from_u64(7))
        .await
        .expect("encounter");
    assert!(client.in_battle());

    let updates = play_out(&mut client, PlayerAction::Attack).await;

    let resolutions: Vec<Resolution> = updates
        .iter()
        .filter_map(|u| match u {
            BattleUpdate::Resolved(r) => Some(*r),
            _ => None,
        })
        .collect();
    assert_eq!(resolutions, vec![Resolution::Victory]);
    let granted = updates
        .iter()
        .filter(|u| matches!(u, BattleUpdate::RewardGranted { .. }))
        .count();
    assert_eq!(granted, 1);

    let st = api.state();
    assert_eq!(st.rewards.len(), 1);
    assert_eq!((st.rewards[0].exp, st.rewards[0].gold), (15, 5));
    assert_eq!(st.profile.experience, 15);
    drop(st);
    assert!(!client.in_battle());
    assert!(matches!(client.battle_action(PlayerAction::Attack).await, Err(ClientError::NoBattle)));
}

#[tokio::test]
async fn goblin_falls_in_three_or_four_hits() {
    for seed in 0..8u64 {
        let (mut client, _api) = client_with(FakeApi::new()).await;
        client
            .start_encounter_with(opponent("Forest Goblin", 30, 0), StdRng::seed_from_u64(seed))
            .await
            .expect("encounter");
        let updates = play_out(&mut client, PlayerAction::Attack).await;
        let hits = updates
            .iter()
            .filter_map(|u| match u {
                BattleUpdate::Log(lines) => Some(lines.iter().filter(|l| l.text.starts_with("You hit")).count()),
                _ => None,
            })
            .sum::<usize>();
        assert!((3..=4).contains(&hits), "seed {} took {} hits", seed, hits);
    }
}

#[tokio::test]
async fn actions_are_rejected_while_opponent_is_pending() {
    let mut config = test_config();
    config.battle.opponent_delay_ms = 200;
    let api = Arc::new(FakeApi::new());
    let mut client = GameClient::with_session(config, api.clone(), logged_in().await);
    client
        .start_encounter_with(opponent("Ogre", 500, 1), StdRng::seed_from_u64(1))
        .await
        .expect("encounter");

    assert_eq!(client.battle_action(PlayerAction::Attack).await.expect("battle"), ActionOutcome::OpponentTurn);
    assert_eq!(client.battle_action(PlayerAction::Attack).await.expect("battle"), ActionOutcome::Rejected);
    assert_eq!(client.battle_action(PlayerAction::Flee).await.expect("battle"), ActionOutcome::Rejected);

    let err = client
        .start_encounter_with(opponent("Second", 10, 1), StdRng::seed_from_u64(2))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::BattleActive));

    let view = client.battle_view().await.expect("view");
    assert_eq!(view.opponent.expect("opponent").spec.name, "Ogre");
}

#[tokio::test]
async fn escape_grants_nothing() {
    let mut config = test_config();
    config.battle.flee_chance = 1.0;
    let api = Arc::new(FakeApi::new());
    let mut client = GameClient::with_session(config, api.clone(), logged_in().await);
    client
        .start_encounter_with(opponent("Wolf", 20, 5), StdRng::seed_from_u64(3))
        .await
        .expect("encounter");

    let updates = play_out(&mut client, PlayerAction::Flee).await;
    assert!(updates.iter().any(|u| matches!(u, BattleUpdate::Resolved(Resolution::Escaped))));
    assert_eq!(api.count("award_reward"), 0);
    assert!(!client.in_battle());
}

#[tokio::test]
async fn defeat_grants_nothing() {
    let api = FakeApi::new();
    api.state().profile = profile(1, 1);
    let (mut client, api) = client_with(api).await;
    client
        .start_encounter_with(opponent("Dragon", 999, 200), StdRng::seed_from_u64(4))
        .await
        .expect("encounter");

    let updates = play_out(&mut client, PlayerAction::Defend).await;
    assert!(updates.iter().any(|u| matches!(u, BattleUpdate::Resolved(Resolution::Defeat))));
    assert!(api.state().rewards.is_empty());
}

#[tokio::test]
async fn logout_ends_running_battle() {
    let mut config = test_config();
    config.battle.opponent_delay_ms = 10_000;
    let api = Arc::new(FakeApi::new());
    let mut client = GameClient::with_session(config, api.clone(), logged_in().await);
    client
        .start_encounter_with(opponent("Ogre", 500, 1), StdRng::seed_from_u64(5))
        .await
        .expect("encounter");
    assert!(client.logout().await);
    assert!(!client.in_battle());
    assert!(matches!(client.battle_action(PlayerAction::Attack).await, Err(ClientError::NoBattle)));
}

#[tokio::test]
async fn expiry_teardown_survives_cancelled_event_wait() {
    let mut config = test_config();
    config.battle.opponent_delay_ms = 10_000;
    let api = Arc::new(FakeApi::new());
    let session = logged_in().await;
    let mut client = GameClient::with_session(config, api.clone(), session.clone());
    client.join_room("ROOM42").await.expect("join");
    client
        .start_encounter_with(opponent("Ogre", 500, 1), StdRng::seed_from_u64(6))
        .await
        .expect("encounter");
    assert_eq!(client.battle_action(PlayerAction::Attack).await.expect("battle"), ActionOutcome::OpponentTurn);

    session.teardown("expired").await;

    // Drain events, dropping each wait at its first pending point.
    for _ in 0..16 {
        tokio::select! {
            biased;
            _ = client.next_event() => {}
            _ = std::future::ready(()) => {}
        }
        if !client.in_battle() && client.current_room().is_none() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(!client.in_battle());
    assert!(client.current_room().is_none());
    assert!(matches!(client.battle_action(PlayerAction::Attack).await, Err(ClientError::NoBattle)));

    let polls = api.count("poll");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(api.count("poll"), polls);
}
