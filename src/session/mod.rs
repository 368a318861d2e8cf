//! Session guard: the bearer token, its expiry timer, and forced logout.
//!
//! A [`SessionContext`] is created once and handed to whatever needs the
//! token (the HTTP gateway, the task cache). Login installs a token, logout
//! or expiry clears it. Every install bumps an epoch so late responses from
//! an older session can be recognised and dropped.

mod store;

use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::AuthTokens;

pub use store::{PersistedSession, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    Requested,
    Unauthorized,
    Expired,
}

impl LogoutReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LogoutReason::Requested => "requested",
            LogoutReason::Unauthorized => "unauthorized",
            LogoutReason::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated { username: Option<String>, epoch: u64 },
}

/// Token plus the session epoch it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bearer {
    pub token: String,
    pub epoch: u64,
}

type LogoutHook = Box<dyn Fn(LogoutReason) + Send + Sync>;

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    username: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    epoch: u64,
    expiry_timer: Option<JoinHandle<()>>,
}

pub struct SessionContext {
    state: Mutex<SessionState>,
    hooks: Mutex<Vec<LogoutHook>>,
    changes: watch::Sender<AuthState>,
    store: Option<SessionStore>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("SessionContext")
            .field("authenticated", &state.token.is_some())
            .field("username", &state.username)
            .field("expires_at", &state.expires_at)
            .field("epoch", &state.epoch)
            .finish()
    }
}

impl SessionContext {
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    pub fn with_store(store: SessionStore) -> Arc<Self> {
        Self::build(Some(store))
    }

    fn build(store: Option<SessionStore>) -> Arc<Self> {
        let (changes, _) = watch::channel(AuthState::Anonymous);
        Arc::new(Self {
            state: Mutex::new(SessionState::default()),
            hooks: Mutex::new(Vec::new()),
            changes,
            store,
        })
    }

    /// Reinstalls a persisted session, if any. An expired one is dropped.
    pub fn restore(self: &Arc<Self>) -> bool {
        let Some(store) = self.store.as_ref() else {
            return false;
        };

        let persisted = match store.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "failed to load persisted session");
                return false;
            }
        };

        if persisted
            .expires_at
            .is_some_and(|expires_at| expires_at <= Utc::now())
        {
            info!("persisted session already expired; discarding");
            if let Err(err) = store.clear() {
                warn!(error = %err, "failed to remove expired session file");
            }
            return false;
        }

        self.install(persisted.token, persisted.username, persisted.expires_at, false);
        self.is_authenticated()
    }

    /// Installs the tokens returned by login/register.
    pub fn establish(self: &Arc<Self>, tokens: &AuthTokens, username: impl Into<String>) {
        let expires_at = expiry_from_tokens(tokens, Utc::now());
        self.install(
            tokens.access_token.clone(),
            Some(username.into()),
            expires_at,
            true,
        );
    }

    /// Installs a token directly. A past-due expiry logs out immediately.
    pub fn set_token(
        self: &Arc<Self>,
        token: impl Into<String>,
        username: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.install(token.into(), username, expires_at, true);
    }

    fn install(
        self: &Arc<Self>,
        token: String,
        username: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        persist: bool,
    ) {
        let epoch = {
            let mut state = self.lock_state();
            if let Some(timer) = state.expiry_timer.take() {
                timer.abort();
            }
            state.epoch += 1;
            state.token = Some(token.clone());
            state.username = username.clone();
            state.expires_at = expires_at;
            state.epoch
        };

        info!(epoch, username = ?username, "session established");
        self.changes.send_replace(AuthState::Authenticated {
            username: username.clone(),
            epoch,
        });

        if let Some(expires_at) = expires_at {
            if expires_at <= Utc::now() {
                self.force_logout_if_current(epoch, LogoutReason::Expired);
                return;
            }
            let timer = self.schedule_expiry(epoch, expires_at);
            let mut state = self.lock_state();
            if state.epoch == epoch {
                state.expiry_timer = timer;
            } else if let Some(timer) = timer {
                timer.abort();
            }
        }

        if persist && let Some(store) = self.store.as_ref() {
            let persisted = PersistedSession {
                token,
                username,
                expires_at,
            };
            if let Err(err) = store.save(&persisted) {
                warn!(error = %err, "failed to persist session");
            }
        }
    }

    fn schedule_expiry(
        self: &Arc<Self>,
        epoch: u64,
        expires_at: DateTime<Utc>,
    ) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; expiry is checked lazily on token access");
            return None;
        };

        let delay = (expires_at - Utc::now()).to_std().unwrap_or_default();
        let session = Arc::downgrade(self);
        Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(session) = session.upgrade() {
                session.force_logout_if_current(epoch, LogoutReason::Expired);
            }
        }))
    }

    pub fn current_token(&self) -> Option<String> {
        self.bearer().map(|bearer| bearer.token)
    }

    /// The token together with its epoch, read atomically.
    pub fn bearer(&self) -> Option<Bearer> {
        let (bearer, expired_epoch) = {
            let state = self.lock_state();
            match (&state.token, state.expires_at) {
                (Some(_), Some(expires_at)) if expires_at <= Utc::now() => (None, Some(state.epoch)),
                (Some(token), _) => (
                    Some(Bearer {
                        token: token.clone(),
                        epoch: state.epoch,
                    }),
                    None,
                ),
                (None, _) => (None, None),
            }
        };

        if let Some(epoch) = expired_epoch {
            self.force_logout_if_current(epoch, LogoutReason::Expired);
        }
        bearer
    }

    pub fn epoch(&self) -> u64 {
        self.lock_state().epoch
    }

    pub fn username(&self) -> Option<String> {
        self.lock_state().username.clone()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().expires_at
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer().is_some()
    }

    /// Whether `epoch` still names the live, authenticated session.
    pub fn is_current(&self, epoch: u64) -> bool {
        let state = self.lock_state();
        state.token.is_some() && state.epoch == epoch
    }

    pub fn logout(&self) -> bool {
        self.force_logout(LogoutReason::Requested)
    }

    /// Clears the token and notifies listeners. Returns `false` when there
    /// was no session to end.
    pub fn force_logout(&self, reason: LogoutReason) -> bool {
        let epoch = self.lock_state().epoch;
        self.force_logout_if_current(epoch, reason)
    }

    /// Ends the session only if it is still the one identified by `epoch`,
    /// so a late 401 from an old session cannot end a newer one.
    pub fn force_logout_if_current(&self, epoch: u64, reason: LogoutReason) -> bool {
        {
            let mut state = self.lock_state();
            if state.epoch != epoch || state.token.is_none() {
                return false;
            }
            if let Some(timer) = state.expiry_timer.take() {
                timer.abort();
            }
            state.token = None;
            state.username = None;
            state.expires_at = None;
            state.epoch += 1;
        }

        info!(reason = reason.as_str(), "session ended");
        if let Some(store) = self.store.as_ref()
            && let Err(err) = store.clear()
        {
            warn!(error = %err, "failed to remove persisted session");
        }

        self.changes.send_replace(AuthState::Anonymous);
        for hook in self.lock_hooks().iter() {
            hook(reason);
        }
        true
    }

    /// Registers a callback run after every logout, forced or requested.
    pub fn on_logout(&self, hook: impl Fn(LogoutReason) + Send + Sync + 'static) {
        self.lock_hooks().push(Box::new(hook));
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.changes.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_hooks(&self) -> MutexGuard<'_, Vec<LogoutHook>> {
        match self.hooks.lock() {
            Ok(hooks) => hooks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        if let Some(timer) = self.lock_state().expiry_timer.take() {
            timer.abort();
        }
    }
}

/// `expiresIn` is in milliseconds; when the server sends zero, fall back to
/// the JWT `exp` claim.
fn expiry_from_tokens(tokens: &AuthTokens, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if tokens.expires_in > 0 {
        let lifetime = chrono::Duration::milliseconds(i64::try_from(tokens.expires_in).ok()?);
        return now.checked_add_signed(lifetime);
    }
    jwt_expiry(&tokens.access_token)
}

/// Reads the `exp` claim of a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}
