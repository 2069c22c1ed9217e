//! Line-oriented terminal front end for `questroom play`.
//!
//! Plain lines are chat; commands start with `/`. Background room and battle
//! updates are printed as they arrive.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::GameApi;
use crate::battle::{
    ActionOutcome, BattleLogLine, BattlePhase, BattleUpdate, BattleView, LogTone, OpponentSpec,
    PlayerAction, Resolution, Turn,
};
use crate::client::{ClientEvent, GameClient};
use crate::errors::ClientError;
use crate::metrics;
use crate::room::{ChoiceKey, EventKind, LogEntry, SyncUpdate};
use crate::world::WorldOutcome;

pub const HELP: &str = "\
Commands:
  /login <name>          log in (password is prompted)
  /logout                log out
  /rooms                 list open rooms
  /create                create a room and join it
  /join <room>           join a room
  /leave                 leave the current room
  /to <who> <text>       interaction aimed at <who>; the narrator answers
  /target [who]          set or clear the default interaction target
  /act <text>            interaction aimed at the default target
  /choose <A|B|C>        answer the narrator's latest question
  /events                engage a random available event
  /look <location>       list interactions at a location
  /use <location> <n>    use interaction <n> at a location
  /fight                 fight a forest goblin
  /train                 practice against the training dummy
  /attack /defend /flee  battle actions
  /status                session, room, battle and counters
  /help                  this text
  /quit                  exit
Anything else is sent to the room as chat.";

/// Render one room log entry as a single display block.
pub fn render_entry(entry: &LogEntry, narrator: &str, system: &str) -> String {
    let ev = &entry.event;
    let mut out = match ev.kind {
        EventKind::Interaction => {
            let to = ev.target.as_deref().unwrap_or("?");
            format!("🎭 {} → {}: {}", ev.sender, to, ev.content)
        }
        EventKind::Broadcast => format!("📢 {}: {}", ev.sender, ev.content),
        EventKind::System => format!("🤖 {}", ev.content),
        EventKind::Chat if ev.sender == narrator => format!("🎲 {}: {}", ev.sender, ev.content),
        EventKind::Chat if ev.sender == system => format!("🤖 {}", ev.content),
        EventKind::Chat => match &ev.target {
            Some(to) => format!("{} → {}: {}", ev.sender, to, ev.content),
            None => format!("{}: {}", ev.sender, ev.content),
        },
    };
    if let Some(set) = &entry.choices {
        if set.is_open() {
            out.push_str("\n   ↳ answer with /choose ");
            let keys: Vec<String> = set.options.iter().map(|o| o.key.to_string()).collect();
            out.push_str(&keys.join("|"));
        }
    }
    out
}

pub fn render_battle_line(line: &BattleLogLine) -> String {
    let mark = match line.tone {
        LogTone::Info => "·",
        LogTone::Damage => "✖",
        LogTone::Heal => "✚",
    };
    format!("  {} {}", mark, line.text)
}

pub fn render_vitals(view: &BattleView) -> String {
    let p = &view.player;
    let mut out = format!("  You  HP {}/{}  MP {}/{}", p.hp, p.max_hp, p.mp, p.max_mp);
    if view.defending {
        out.push_str("  [guarding]");
    }
    if let Some(op) = &view.opponent {
        out.push_str(&format!(
            "\n  {} {}  HP {}/{}",
            op.spec.avatar, op.spec.name, op.hp, op.spec.max_hp
        ));
    }
    if view.phase == BattlePhase::InBattle(Turn::Player) {
        out.push_str("\n  Your move: /attack /defend /flee");
    }
    out
}

fn render_resolution(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Victory => "🏆 Victory!",
        Resolution::Defeat => "💀 Defeat.",
        Resolution::Escaped => "🏃 You escaped.",
    }
}

fn render_outcome(outcome: &WorldOutcome) -> String {
    match outcome {
        WorldOutcome::Nothing => "Nothing happens.".to_string(),
        WorldOutcome::Encounter { source, opponent } => {
            format!("⚔️  {}: {} {} appears!", source, opponent.avatar, opponent.name)
        }
        WorldOutcome::Triggered { source, message } => format!("✨ {}: {}", source, message),
        WorldOutcome::Collaborator { kind, source } => {
            format!("{} {} is not available from the terminal.", kind.icon(), source)
        }
    }
}

fn print_event<A: GameApi>(client: &GameClient<A>, event: &ClientEvent) {
    let narrator = &client.config().room.narrator_name;
    let system = &client.config().room.system_name;
    match event {
        ClientEvent::Room(SyncUpdate::Events(entries)) => {
            for entry in entries {
                println!("{}", render_entry(entry, narrator, system));
            }
        }
        ClientEvent::Room(SyncUpdate::Participants(list)) => {
            println!("👥 here: {}", list.join(", "));
        }
        ClientEvent::Room(SyncUpdate::Failed(reason)) => {
            println!("⚠️  room refresh failed: {}", reason);
        }
        ClientEvent::Battle(BattleUpdate::Log(lines)) => {
            for line in lines {
                println!("{}", render_battle_line(line));
            }
        }
        ClientEvent::Battle(BattleUpdate::Vitals(view)) => println!("{}", render_vitals(view)),
        ClientEvent::Battle(BattleUpdate::Resolved(r)) => println!("{}", render_resolution(*r)),
        ClientEvent::Battle(BattleUpdate::RewardGranted { reward, profile }) => println!(
            "💰 +{} exp, +{} gold (now {} exp, {} gold)",
            reward.exp, reward.gold, profile.experience, profile.gold
        ),
        ClientEvent::Battle(BattleUpdate::RewardFailed(reason)) => {
            println!("⚠️  reward not saved: {}", reason)
        }
        ClientEvent::Battle(BattleUpdate::ReturnToAmbient) => println!("— back to exploring —"),
        ClientEvent::SessionChanged(Some(who)) => println!("🔑 logged in as {}", who),
        ClientEvent::SessionChanged(None) => println!("🔒 session ended; please /login again"),
    }
}

async fn prompt_password() -> Result<String> {
    let secret = tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: ")).await??;
    Ok(secret)
}

fn report(result: Result<(), ClientError>) {
    if let Err(e) = result {
        println!("⚠️  {}", e);
    }
}

async fn print_status<A: GameApi>(client: &GameClient<A>) {
    match client.identity() {
        Some(who) => println!("User: {}", who),
        None => println!("User: (not logged in)"),
    }
    match client.current_room() {
        Some(room) => println!("Room: {}", room),
        None => println!("Room: (none)"),
    }
    if let Some(snapshot) = client.room_snapshot().await {
        println!(
            "  {} events, watermark {:.3}, participants: {}",
            snapshot.log.len(),
            snapshot.last_seen,
            snapshot.roster.join(", ")
        );
        if let Some(sel) = snapshot.selected {
            println!("  default target: {}", sel);
        }
    }
    if let Some(view) = client.battle_view().await {
        println!("{}", render_vitals(&view));
    }
    let m = metrics::snapshot();
    println!(
        "Sync: ok={} failed={} accepted={} suppressed={} roster_rebuilds={} teardowns={}",
        m.sync_ok, m.sync_failed, m.events_accepted, m.events_suppressed, m.roster_rebuilds, m.session_teardowns
    );
}

async fn battle(client: &GameClient<impl GameApi>, action: PlayerAction) {
    match client.battle_action(action).await {
        Ok(ActionOutcome::Rejected) => println!("⏳ not your turn."),
        Ok(_) => {}
        Err(e) => println!("⚠️  {}", e),
    }
}

/// Handle one input line. Returns `false` to quit.
async fn handle_line<A: GameApi>(client: &mut GameClient<A>, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    if !line.starts_with('/') {
        report(client.say(line, None).await);
        return true;
    }
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    match cmd.to_ascii_lowercase().as_str() {
        "/quit" | "/exit" => return false,
        "/help" => println!("{}", HELP),
        "/login" => {
            if rest.is_empty() {
                println!("usage: /login <name>");
            } else {
                match prompt_password().await {
                    Ok(secret) => match client.login(rest, &secret).await {
                        Ok(who) => println!("Welcome, {}.", who),
                        Err(e) => println!("⚠️  {}", e),
                    },
                    Err(e) => println!("⚠️  could not read password: {}", e),
                }
            }
        }
        "/logout" => {
            if client.logout().await {
                println!("Logged out.");
            } else {
                println!("Not logged in.");
            }
        }
        "/rooms" => match client.list_rooms().await {
            Ok(rooms) if rooms.is_empty() => println!("No open rooms."),
            Ok(rooms) => {
                for r in rooms {
                    println!("  {}  host={} users={}/{}", r.room_id, r.host, r.user_count, r.max_users);
                }
            }
            Err(e) => println!("⚠️  {}", e),
        },
        "/create" => match client.create_room().await {
            Ok(id) => println!("Created room {}.", id),
            Err(e) => println!("⚠️  {}", e),
        },
        "/join" => match client.join_room(rest).await {
            Ok(()) => println!("Joined room {}.", rest),
            Err(e) => println!("⚠️  {}", e),
        },
        "/leave" => match client.leave_room().await {
            Ok(id) => println!("Left room {}.", id),
            Err(e) => println!("⚠️  {}", e),
        },
        "/to" => {
            let (who, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            report(client.send_interaction(Some(who), text).await);
        }
        "/act" => report(client.send_interaction(None, rest).await),
        "/target" => {
            let who = if rest.is_empty() { None } else { Some(rest) };
            report(client.select_addressee(who).await);
        }
        "/choose" => match ChoiceKey::parse(rest) {
            Some(key) => match client.select_choice(key).await {
                Ok(phrase) => println!("You: {}", phrase),
                Err(e) => println!("⚠️  {}", e),
            },
            None => println!("usage: /choose <A|B|C>"),
        },
        "/events" => match client.engage_random_event().await {
            Ok(outcome) => println!("{}", render_outcome(&outcome)),
            Err(e) => println!("⚠️  {}", e),
        },
        "/look" => match client.location_interactions(rest).await {
            Ok(list) if list.is_empty() => println!("Nothing to do here."),
            Ok(list) => {
                for (i, it) in list.iter().enumerate() {
                    println!("  {}. {} {}", i + 1, it.kind.icon(), it.name);
                }
            }
            Err(e) => println!("⚠️  {}", e),
        },
        "/use" => {
            let (location, index) = match rest.rsplit_once(char::is_whitespace) {
                Some((loc, n)) => (loc.trim(), n.parse::<usize>().ok()),
                None => (rest, None),
            };
            match index {
                Some(n) if n > 0 => match client.location_interactions(location).await {
                    Ok(list) => match list.get(n - 1) {
                        Some(it) => match client.interact(it).await {
                            Ok(outcome) => println!("{}", render_outcome(&outcome)),
                            Err(e) => println!("⚠️  {}", e),
                        },
                        None => println!("No interaction {} at {}.", n, location),
                    },
                    Err(e) => println!("⚠️  {}", e),
                },
                _ => println!("usage: /use <location> <number>"),
            }
        }
        "/fight" => report(client.start_encounter(OpponentSpec::forest_goblin()).await),
        "/train" => match client.train().await {
            Ok(opponent) => println!("⚔️  {} {} steps up.", opponent.avatar, opponent.name),
            Err(e) => println!("⚠️  {}", e),
        },
        "/attack" => battle(client, PlayerAction::Attack).await,
        "/defend" => battle(client, PlayerAction::Defend).await,
        "/flee" => battle(client, PlayerAction::Flee).await,
        "/status" => print_status(client).await,
        other => println!("Unknown command {}. Try /help.", other),
    }
    true
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run<A: GameApi>(mut client: GameClient<A>) -> Result<()> {
    match client.restore_session().await {
        Ok(Some(who)) => println!("Welcome back, {}.", who),
        Ok(None) => println!("Not logged in. Use /login <name>."),
        Err(e) => println!("⚠️  could not restore session: {}", e),
    }
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&mut client, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(event) = client.next_event() => print_event(&client, &event),
        }
    }
    if client.current_room().is_some() {
        report(client.leave_room().await.map(|_| ()));
    }
    Ok(())
}
