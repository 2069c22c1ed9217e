//! # Questroom - multiplayer narrative room client
//!
//! Questroom is a client for a shared-room, narrator-driven role-playing
//! backend. Players meet in rooms, send interactions that a narrator answers,
//! pick from multiple-choice prompts the narrator addresses to them, and fight
//! turn-based battles started by world events.
//!
//! ## Features
//!
//! - **Room synchronization**: interval polling behind a timestamp watermark with duplicate suppression and participant diffing.
//! - **Narrator choices**: `A) / B) / C)` prompts addressed to `@you` become one-shot selectable options.
//! - **Interaction dispatch**: interactions and choices are submitted, then the narrator's reply is pulled in by forced refreshes.
//! - **Turn-based battles**: attack / defend / flee with paced opponent turns and reward delivery.
//! - **World triggers**: backend events and location interactions that start encounters or report results.
//! - **Session handling**: remembered sessions, validation on start, uniform teardown on rejection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use questroom::api::HttpApi;
//! use questroom::client::GameClient;
//! use questroom::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("questroom.toml").await?;
//!     let api = HttpApi::new(&config.server);
//!     let mut client = GameClient::new(config, api);
//!     client.login("alice", "secret").await?;
//!     let room = client.create_room().await?;
//!     println!("hosting {}", room);
//!     while let Some(event) = client.next_event().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`api`] - Backend trait and the HTTP adapter
//! - [`session`] - Session context, persistence and teardown
//! - [`room`] - Synchronizer, choice extraction and interaction dispatch
//! - [`battle`] - Battle engine and the task that paces it
//! - [`world`] - Triggered events and location interactions
//! - [`client`] - Root controller owning all of the above
//! - [`terminal`] - Line-oriented front end
//! - [`config`] - Configuration management and validation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   GameClient    │ ← owns session, room, battle
//! └─────────────────┘
//!     │         │
//! ┌────────┐ ┌────────┐
//! │  room  │ │ battle │ ← background tasks, command handles
//! └────────┘ └────────┘
//!     │         │
//! ┌─────────────────┐
//! │  GameApi (HTTP) │ ← backend
//! └─────────────────┘
//! ```

pub mod api;
pub mod battle;
pub mod client;
pub mod config;
pub mod errors;
pub mod logutil;
pub mod metrics;
pub mod room;
pub mod session;
pub mod terminal;
pub mod world;
