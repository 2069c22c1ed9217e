//! HTTP adapter for the game backend's JSON routes.
//!
//! Every response is an envelope `{"success": bool, ...}`. A `false` envelope
//! carries its reason in `error` (or `message`) and becomes
//! [`ApiError::Domain`]; HTTP 401 becomes [`ApiError::Unauthorized`].

use log::debug;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;

use super::{Credential, GameApi, PlayerProfile};
use crate::battle::{OpponentSpec, Reward};
use crate::config::ServerConfig;
use crate::errors::{ApiError, ApiResult};
use crate::room::{EventSubmission, NarratorPrompt, Participant, PollBatch, RoomEvent, RoomSummary};
use crate::world::{LocationInteraction, TriggeredEvent};

const TOKEN_HEADER: &str = "X-Session-Token";

pub struct HttpApi {
    base_url: String,
    timeout_seconds: u64,
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: config.request_timeout_seconds,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str, cred: Option<&Credential>, body: Value) -> RequestBuilder {
        let req = self.client.post(self.url(path)).json(&body);
        match cred {
            Some(c) => req.header(TOKEN_HEADER, c.expose()),
            None => req,
        }
    }

    fn get(&self, path: &str, cred: Option<&Credential>) -> RequestBuilder {
        let req = self.client.get(self.url(path));
        match cred {
            Some(c) => req.header(TOKEN_HEADER, c.expose()),
            None => req,
        }
    }

    async fn send(&self, request: RequestBuilder) -> ApiResult<Value> {
        let limit = Duration::from_secs(self.timeout_seconds);
        let response = timeout(limit, request.send())
            .await
            .map_err(|_| ApiError::Timeout(self.timeout_seconds))?
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let body = timeout(limit, response.text())
            .await
            .map_err(|_| ApiError::Timeout(self.timeout_seconds))?
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        interpret_response(status, &body)
    }
}

fn envelope_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Map status and body to the envelope payload or an [`ApiError`].
pub fn interpret_response(status: StatusCode, body: &str) -> ApiResult<Value> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    if status == StatusCode::UNAUTHORIZED {
        let reason = parsed
            .as_ref()
            .and_then(envelope_error)
            .unwrap_or_else(|| "session rejected".to_string());
        return Err(ApiError::Unauthorized(reason));
    }
    let value = match parsed {
        Some(v) => v,
        None if status.is_success() => {
            return Err(ApiError::Decode(format!("expected JSON body (status {})", status)))
        }
        None => return Err(ApiError::Transport(format!("HTTP {}", status))),
    };
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::Domain(
            envelope_error(&value).unwrap_or_else(|| "request failed".to_string()),
        ));
    }
    if !status.is_success() {
        return Err(ApiError::Transport(format!("HTTP {}", status)));
    }
    Ok(value)
}

fn field<T: DeserializeOwned>(value: &Value, key: &str) -> ApiResult<T> {
    let raw = value
        .get(key)
        .cloned()
        .ok_or_else(|| ApiError::Decode(format!("missing field '{}'", key)))?;
    serde_json::from_value(raw).map_err(|e| ApiError::Decode(format!("field '{}': {}", key, e)))
}

fn optional_list<T: DeserializeOwned>(value: Option<&Value>, what: &str) -> ApiResult<Vec<T>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| ApiError::Decode(format!("{}: {}", what, e))),
    }
}

/// Decode a `/get_room_messages` payload.
pub fn parse_poll_batch(value: &Value) -> ApiResult<PollBatch> {
    let events: Vec<RoomEvent> = optional_list(value.get("messages"), "messages")?;
    let participants: Vec<Participant> = optional_list(
        value.get("room_info").and_then(|info| info.get("users")),
        "room_info.users",
    )?;
    Ok(PollBatch {
        events,
        participants,
    })
}

/// Opponent inside a `/api/events/battle/<id>` payload, if any.
pub fn parse_battle_data(value: &Value) -> ApiResult<Option<OpponentSpec>> {
    match value.get("battle_data").and_then(|d| d.get("enemy")) {
        None | Some(Value::Null) => Ok(None),
        Some(enemy) => serde_json::from_value(enemy.clone())
            .map(Some)
            .map_err(|e| ApiError::Decode(format!("battle_data.enemy: {}", e))),
    }
}

/// Human-readable result of `/api/events/trigger/<id>`.
pub fn trigger_message(value: &Value) -> String {
    value
        .get("result")
        .and_then(|r| r.get("description"))
        .and_then(Value::as_str)
        .or_else(|| value.get("message").and_then(Value::as_str))
        .unwrap_or("The event unfolds.")
        .to_string()
}

impl GameApi for HttpApi {
    async fn authenticate(&self, identity: &str, secret: &str) -> ApiResult<Credential> {
        let body = json!({ "username": identity, "password": secret });
        let value = self.send(self.post("/login", None, body)).await?;
        let token: String = field(&value, "session_token")?;
        Ok(Credential::new(token))
    }

    async fn validate(&self, cred: &Credential) -> ApiResult<bool> {
        match self.send(self.post("/validate_session", Some(cred), json!({}))).await {
            Ok(_) => Ok(true),
            Err(ApiError::Domain(reason)) => {
                debug!("session validation refused: {}", reason);
                Ok(false)
            }
            Err(ApiError::Unauthorized(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn revoke(&self, cred: &Credential) -> ApiResult<()> {
        self.send(self.post("/logout", Some(cred), json!({}))).await?;
        Ok(())
    }

    async fn create_room(&self, cred: &Credential) -> ApiResult<String> {
        let value = self.send(self.post("/create_room", Some(cred), json!({}))).await?;
        field(&value, "room_id")
    }

    async fn join_room(&self, cred: &Credential, room_id: &str) -> ApiResult<()> {
        self.send(self.post("/join_room", Some(cred), json!({ "room_id": room_id })))
            .await?;
        Ok(())
    }

    async fn leave_room(&self, cred: &Credential, room_id: &str) -> ApiResult<()> {
        self.send(self.post("/leave_room", Some(cred), json!({ "room_id": room_id })))
            .await?;
        Ok(())
    }

    async fn list_rooms(&self) -> ApiResult<Vec<RoomSummary>> {
        let value = self.send(self.get("/get_room_list", None)).await?;
        optional_list(value.get("rooms"), "rooms")
    }

    async fn poll_room(&self, cred: &Credential, room_id: &str, since: f64) -> ApiResult<PollBatch> {
        let body = json!({ "room_id": room_id, "since_timestamp": since });
        let value = self.send(self.post("/get_room_messages", Some(cred), body)).await?;
        parse_poll_batch(&value)
    }

    async fn submit_room_event(&self, cred: &Credential, submission: &EventSubmission) -> ApiResult<()> {
        let body = serde_json::to_value(submission).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.send(self.post("/send_room_message", Some(cred), body)).await?;
        Ok(())
    }

    async fn provoke_narrator_response(&self, cred: &Credential, prompt: &NarratorPrompt) -> ApiResult<()> {
        let body = serde_json::to_value(prompt).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.send(self.post("/trigger_dm_response", Some(cred), body)).await?;
        Ok(())
    }

    async fn fetch_profile(&self, cred: &Credential) -> ApiResult<PlayerProfile> {
        let value = self.send(self.post("/get_user_data", Some(cred), json!({}))).await?;
        field(&value, "data")
    }

    async fn award_reward(&self, cred: &Credential, reward: Reward) -> ApiResult<PlayerProfile> {
        let current = self.fetch_profile(cred).await?;
        let next = current.with_reward(reward);
        let body = json!({ "experience": next.experience, "gold": next.gold });
        let value = self.send(self.post("/update_user_stats", Some(cred), body)).await?;
        match value.get("data") {
            Some(_) => field(&value, "data"),
            None => Ok(next),
        }
    }

    async fn check_triggered_events(&self, cred: &Credential) -> ApiResult<Vec<TriggeredEvent>> {
        let value = self.send(self.post("/api/events/check", Some(cred), json!({}))).await?;
        optional_list(value.get("events"), "events")
    }

    async fn trigger_event(&self, cred: &Credential, event_id: i64) -> ApiResult<String> {
        let path = format!("/api/events/trigger/{}", event_id);
        let value = self.send(self.post(&path, Some(cred), json!({}))).await?;
        Ok(trigger_message(&value))
    }

    async fn resolve_event(&self, cred: &Credential, event_id: i64) -> ApiResult<Option<OpponentSpec>> {
        let path = format!("/api/events/battle/{}", event_id);
        let value = self.send(self.post(&path, Some(cred), json!({}))).await?;
        parse_battle_data(&value)
    }

    async fn location_interactions(
        &self,
        cred: &Credential,
        location: &str,
    ) -> ApiResult<Vec<LocationInteraction>> {
        let path = format!("/get_location_info?location={}", urlencoding::encode(location));
        let value = self.send(self.get(&path, Some(cred))).await?;
        optional_list(
            value.get("location").and_then(|l| l.get("interactions")),
            "location.interactions",
        )
    }

    async fn training_battle(&self, cred: &Credential) -> ApiResult<Option<OpponentSpec>> {
        let value = self
            .send(self.post("/api/training/dummy-battle", Some(cred), json!({})))
            .await?;
        parse_battle_data(&value)
    }
}
