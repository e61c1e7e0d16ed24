//! Presence token lifecycle.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rollcall_core::{PresenceToken, Redemption, TokenConfig, TokenPayload};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TokenError;
use crate::store::TokenStore;

/// Random bytes behind every token identifier.
const TOKEN_BYTES: usize = 32;

/// Expiry of the redemption list when the token's own TTL cannot be read.
const MIN_REDEMPTION_TTL: Duration = Duration::from_secs(1);

/// A freshly issued token together with its renderable payload.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: PresenceToken,
    pub payload: TokenPayload,
}

/// What a client submitted after scanning a code.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedToken {
    pub token: String,
    /// Session named by the payload, when the client sent the full payload.
    pub session_id: Option<String>,
}

/// Who redeemed a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenUsage {
    pub count: usize,
    /// Users in redemption order. A user redeeming twice appears twice.
    pub user_ids: Vec<String>,
}

impl TokenUsage {
    /// Number of different users that redeemed the token.
    pub fn distinct_users(&self) -> usize {
        let mut users: Vec<&String> = self.user_ids.iter().collect();
        users.sort();
        users.dedup();
        users.len()
    }
}

/// Issues, rotates, redeems and invalidates presence tokens.
///
/// Validity lives entirely in the store: a token exists exactly as long as its record key.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    config: TokenConfig,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, config: TokenConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_secs)
    }

    fn token_key(&self, token: &str) -> String {
        format!("{}:token:{}", self.config.key_prefix, token)
    }

    fn redemptions_key(&self, token: &str) -> String {
        format!("{}:token:{}:redemptions", self.config.key_prefix, token)
    }

    fn current_key(&self, session_id: &str) -> String {
        format!("{}:session:{}:current", self.config.key_prefix, session_id)
    }

    fn generation_key(&self, session_id: &str) -> String {
        format!("{}:session:{}:generation", self.config.key_prefix, session_id)
    }

    /// Issue a token and make it the session's current one.
    ///
    /// Any token it displaces is invalidated so that a session never has two live tokens.
    pub async fn issue(&self, session_id: &str, room_id: &str) -> Result<IssuedToken, TokenError> {
        let (issued, displaced) = self.install(session_id, room_id).await?;
        if let Some(previous) = displaced {
            warn!(session_id = %session_id, "issuing over a live token, invalidating it");
            self.invalidate(&previous).await?;
        }
        info!(
            session_id = %session_id,
            room_id = %room_id,
            generation = issued.token.generation,
            valid_until = %issued.token.valid_until,
            "presence token issued"
        );
        Ok(issued)
    }

    /// Replace the session's current token.
    ///
    /// The new token is written before the current pointer is swapped, so a reader always finds a
    /// current token. Each token is displaced by exactly one swap, and only its displacer deletes
    /// it, so concurrent rotations leave a single live token.
    pub async fn rotate(&self, session_id: &str, room_id: &str) -> Result<IssuedToken, TokenError> {
        let (issued, displaced) = self.install(session_id, room_id).await?;
        if let Some(previous) = displaced {
            self.invalidate(&previous).await?;
        }
        info!(
            session_id = %session_id,
            generation = issued.token.generation,
            "presence token rotated"
        );
        Ok(issued)
    }

    async fn install(&self, session_id: &str, room_id: &str) -> Result<(IssuedToken, Option<String>), TokenError> {
        let generation = self.store.incr(&self.generation_key(session_id)).await?;
        let issued_at = Utc::now();
        let valid_until = issued_at + chrono::Duration::seconds(self.config.ttl_secs as i64);

        let token = PresenceToken {
            token: generate_token_id(),
            session_id: session_id.to_string(),
            room_id: room_id.to_string(),
            issued_at,
            valid_until,
            generation,
            redemptions: Vec::new(),
        };

        let record = serde_json::to_string(&token)?;
        self.store.set_ex(&self.token_key(&token.token), &record, self.ttl()).await?;
        let displaced = self
            .store
            .swap_ex(&self.current_key(session_id), &token.token, self.ttl())
            .await?
            .filter(|previous| previous != &token.token);

        let payload = token.payload();
        Ok((IssuedToken { token, payload }, displaced))
    }

    /// Delete a token and its redemptions. Unknown tokens are ignored.
    pub async fn invalidate(&self, token: &str) -> Result<(), TokenError> {
        let existed = self.store.delete(&self.token_key(token)).await?;
        self.store.delete(&self.redemptions_key(token)).await?;
        debug!(existed, "presence token invalidated");
        Ok(())
    }

    /// Invalidate the session's current token and drop the pointer.
    pub async fn invalidate_session(&self, session_id: &str) -> Result<(), TokenError> {
        let key = self.current_key(session_id);
        if let Some(token) = self.store.get(&key).await? {
            self.invalidate(&token).await?;
        }
        self.store.delete(&key).await?;
        info!(session_id = %session_id, "session tokens invalidated");
        Ok(())
    }

    /// The session's current token, if it is still live.
    pub async fn current(&self, session_id: &str) -> Result<Option<PresenceToken>, TokenError> {
        match self.store.get(&self.current_key(session_id)).await? {
            Some(token) => self.lookup(&token).await,
            None => Ok(None),
        }
    }

    /// A token record with its redemptions, if the token is still live.
    pub async fn lookup(&self, token: &str) -> Result<Option<PresenceToken>, TokenError> {
        let Some(raw) = self.store.get(&self.token_key(token)).await? else {
            return Ok(None);
        };
        let mut record: PresenceToken = serde_json::from_str(&raw)?;
        record.redemptions = self.redemptions(token).await?;
        Ok(Some(record))
    }

    async fn redemptions(&self, token: &str) -> Result<Vec<Redemption>, TokenError> {
        let items = self.store.list(&self.redemptions_key(token)).await?;
        let mut redemptions = Vec::with_capacity(items.len());
        for item in items {
            redemptions.push(serde_json::from_str(&item)?);
        }
        Ok(redemptions)
    }

    /// Check a scanned token against the claimed session at `now`.
    pub async fn validate(
        &self,
        scanned: &ScannedToken,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PresenceToken, TokenError> {
        if let Some(named) = &scanned.session_id {
            if named != session_id {
                return Err(TokenError::SessionMismatch {
                    expected: session_id.to_string(),
                    found: named.clone(),
                });
            }
        }

        let record = self.lookup(&scanned.token).await?.ok_or(TokenError::Expired)?;
        if record.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        if record.session_id != session_id {
            return Err(TokenError::SessionMismatch {
                expected: session_id.to_string(),
                found: record.session_id,
            });
        }
        Ok(record)
    }

    /// Record that `user_id` used the token. Returns the number of redemptions so far.
    ///
    /// Redeeming never invalidates the token: several users redeeming the same token is a risk
    /// signal, not a rejection.
    pub async fn redeem(&self, token: &str, user_id: &str) -> Result<usize, TokenError> {
        let now = Utc::now();
        let record = self.lookup(token).await?.ok_or(TokenError::Expired)?;
        if record.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        let remaining = self
            .store
            .ttl(&self.token_key(token))
            .await?
            .unwrap_or(MIN_REDEMPTION_TTL)
            .max(MIN_REDEMPTION_TTL);
        let entry = serde_json::to_string(&Redemption {
            user_id: user_id.to_string(),
            at: now,
        })?;
        let count = self.store.append(&self.redemptions_key(token), &entry, remaining).await?;

        if count > 1 {
            debug!(session_id = %record.session_id, count, "token redeemed more than once");
        }
        Ok(count)
    }

    /// How many times, and by whom, a token was redeemed.
    pub async fn usage(&self, token: &str) -> Result<TokenUsage, TokenError> {
        let redemptions = self.redemptions(token).await?;
        Ok(TokenUsage {
            count: redemptions.len(),
            user_ids: redemptions.into_iter().map(|r| r.user_id).collect(),
        })
    }
}

/// Parse what a client scanned.
///
/// Accepts the JSON payload rendered by [`PresenceToken::payload`] or a bare token identifier.
/// Either way the identifier must decode to exactly 32 bytes.
pub fn parse_scanned(raw: &str) -> Result<ScannedToken, TokenError> {
    let raw = raw.trim();
    let scanned = if raw.starts_with('{') {
        let payload =
            TokenPayload::from_json(raw).map_err(|e| TokenError::InvalidFormat(format!("bad payload: {}", e)))?;
        ScannedToken {
            token: payload.token,
            session_id: Some(payload.session_id),
        }
    } else {
        ScannedToken {
            token: raw.to_string(),
            session_id: None,
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(scanned.token.as_bytes())
        .map_err(|e| TokenError::InvalidFormat(format!("bad token encoding: {}", e)))?;
    if bytes.len() != TOKEN_BYTES {
        return Err(TokenError::InvalidFormat(format!(
            "token must carry {} bytes, got {}",
            TOKEN_BYTES,
            bytes.len()
        )));
    }
    Ok(scanned)
}

fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
