use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;
use tokio::sync::watch;

use crate::api::{Credential, GameApi};
use crate::errors::{ApiError, ClientError};
use crate::logutil::escape_log;
use crate::metrics;

macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}

/// # Session Context
///
/// Holds the authenticated identity and credential for this client. Exactly
/// one session exists at a time; every component reads it through a shared
/// [`SessionContext`] instead of keeping its own copy.
///
/// ## Lifecycle
///
/// 1. **Anonymous** - no session; guarded calls are skipped
/// 2. **Active** - established by [`SessionContext::login`] or [`SessionContext::restore`]
/// 3. **Torn down** - logout, or any guarded call answered with `Unauthorized`
///
/// Teardown clears the credential, deletes the remembered session file and
/// notifies subscribers so open rooms and battles can stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub credential: Credential,
}

/// JSON file remembering the last session between runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<Session>, ClientError> {
        match fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let text = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, text).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct SessionContext {
    current: Mutex<Option<Session>>,
    store: Option<SessionStore>,
    changes: watch::Sender<Option<String>>,
}

impl SessionContext {
    pub fn new(store: Option<SessionStore>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            current: Mutex::new(None),
            store,
            changes,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        match self.current.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn identity(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.identity.clone())
    }

    pub fn credential(&self) -> Option<Credential> {
        self.lock().as_ref().map(|s| s.credential.clone())
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Receives the active identity on login and `None` on teardown or logout.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.changes.subscribe()
    }

    /// Install `session` as the active session and remember it.
    pub async fn establish(&self, session: Session) {
        let identity = session.identity.clone();
        *self.lock() = Some(session.clone());
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&session).await {
                warn!(
                    "could not remember session at {}: {}",
                    store.path().display(),
                    e
                );
            }
        }
        self.changes.send_replace(Some(identity));
    }

    pub async fn login<A: GameApi>(
        &self,
        api: &A,
        identity: &str,
        secret: &str,
    ) -> Result<String, ClientError> {
        let identity = identity.trim();
        if identity.is_empty() || secret.trim().is_empty() {
            return Err(ClientError::validation("username and password are required"));
        }
        let credential = api.authenticate(identity, secret).await?;
        info!("login ok user={}", escape_log(identity));
        self.establish(Session {
            identity: identity.to_string(),
            credential,
        })
        .await;
        Ok(identity.to_string())
    }

    /// Re-activate the remembered session if the backend still honours it.
    ///
    /// An invalid credential deletes the file. Transport failures leave the
    /// file in place and are returned to the caller.
    pub async fn restore<A: GameApi>(&self, api: &A) -> Result<Option<String>, ClientError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let saved = match store.load().await {
            Ok(Some(s)) => s,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("discarding unreadable session file {}: {}", store.path().display(), e);
                store.clear().await?;
                return Ok(None);
            }
        };
        match api.validate(&saved.credential).await {
            Ok(true) => {
                let identity = saved.identity.clone();
                info!("restored session user={}", escape_log(&identity));
                *self.lock() = Some(saved);
                self.changes.send_replace(Some(identity.clone()));
                Ok(Some(identity))
            }
            Ok(false) | Err(ApiError::Unauthorized(_)) => {
                sec_log!(
                    "remembered session rejected user={}",
                    escape_log(&saved.identity)
                );
                store.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Revoke and forget the session. Returns `false` without any network
    /// call when no session is active.
    pub async fn logout<A: GameApi>(&self, api: &A) -> bool {
        let taken = self.lock().take();
        let Some(session) = taken else {
            return false;
        };
        if let Err(e) = api.revoke(&session.credential).await {
            debug!("revoke failed during logout: {}", e);
        }
        self.forget().await;
        info!("logout user={}", escape_log(&session.identity));
        true
    }

    /// Drop the session after the backend rejected it. Idempotent.
    pub async fn teardown(&self, reason: &str) {
        let taken = self.lock().take();
        let Some(session) = taken else {
            return;
        };
        metrics::inc_session_teardowns();
        sec_log!(
            "session torn down user={} reason={}",
            escape_log(&session.identity),
            escape_log(reason)
        );
        self.forget().await;
    }

    async fn forget(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.clear().await {
                warn!("could not delete session file: {}", e);
            }
        }
        self.changes.send_replace(None);
    }

    /// Run an authenticated call.
    ///
    /// `Ok(None)` means the call did not produce a value because there is no
    /// session, or because the backend answered `Unauthorized` and the session
    /// has just been torn down. Other failures are returned unchanged.
    pub async fn guard<T, F, Fut>(&self, f: F) -> Result<Option<T>, ApiError>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let Some(credential) = self.credential() else {
            return Ok(None);
        };
        match f(credential).await {
            Ok(v) => Ok(Some(v)),
            Err(ApiError::Unauthorized(msg)) => {
                self.teardown(&msg).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
