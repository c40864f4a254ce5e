use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use drupe_core::error::GateReason;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Clock skew tolerance on `exp`, in seconds.
const LEEWAY_SECONDS: u64 = 30;

/// Soft cap on the refresh-token revocation set; exceeding it triggers an
/// inline prune of expired entries.
const REVOCATION_SOFT_CAP: usize = 10_000;

/// Self-describing token kinds. `parse` rejects a token whose kind does
/// not match the consumer, even when signature and expiry are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    TwofaStaging,
    PasswordReset,
    EmailVerify,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::TwofaStaging => "twofa_staging",
            TokenKind::PasswordReset => "password_reset",
            TokenKind::EmailVerify => "email_verify",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("wrong token kind")]
    WrongKind,
}

impl TokenError {
    /// Wire reason code for the gate. Bad signatures are reported as
    /// malformed on the wire; the distinction stays in server logs.
    pub fn gate_reason(&self) -> GateReason {
        match self {
            TokenError::Expired => GateReason::TokenExpired,
            TokenError::WrongKind => GateReason::TokenKindMismatch,
            TokenError::Malformed | TokenError::BadSignature => GateReason::TokenMalformed,
        }
    }
}

/// JWT claims carried by every drupe token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal id)
    pub sub: Uuid,
    /// Token kind
    pub kind: TokenKind,
    /// Session id, present on access tokens bound to a session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
    /// JWT ID (revocation key for refresh tokens)
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

struct KeyMaterial {
    kid: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyMaterial {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            kid: Uuid::new_v4().to_string(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

struct KeySet {
    active: KeyMaterial,
    /// Previous key, still accepted within the rotation grace window.
    previous: Option<(KeyMaterial, DateTime<Utc>)>,
}

/// Token service: mints and validates the bearer credentials of the gate.
///
/// Signing keys live behind a copy-on-write pointer; rotation swaps the
/// active key atomically and keeps the previous key accepted for the
/// length of the access-token TTL.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<RwLock<Arc<KeySet>>>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    staging_ttl: Duration,
    revoked: Arc<DashMap<String, i64>>,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        let keyset = KeySet {
            active: KeyMaterial::from_secret(config.secret.as_bytes()),
            previous: None,
        };
        tracing::info!("Token service initialised with HS256 key");
        Self {
            keys: Arc::new(RwLock::new(Arc::new(keyset))),
            access_ttl: Duration::minutes(config.access_token_expiry_minutes),
            refresh_ttl: Duration::days(config.refresh_token_expiry_days),
            staging_ttl: Duration::minutes(config.staging_token_expiry_minutes),
            revoked: Arc::new(DashMap::new()),
        }
    }

    fn keyset(&self) -> Arc<KeySet> {
        self.keys
            .read()
            .expect("token key lock poisoned")
            .clone()
    }

    /// Swap in a new signing secret. Tokens signed with the previous key
    /// remain valid for the access-token TTL.
    pub fn rotate(&self, new_secret: &[u8]) {
        let mut guard = self.keys.write().expect("token key lock poisoned");
        let old = guard.clone();
        let rotated = KeySet {
            active: KeyMaterial::from_secret(new_secret),
            previous: Some((
                KeyMaterial {
                    kid: old.active.kid.clone(),
                    encoding: old.active.encoding.clone(),
                    decoding: old.active.decoding.clone(),
                },
                Utc::now(),
            )),
        };
        *guard = Arc::new(rotated);
        tracing::info!("Signing key rotated");
    }

    fn mint(&self, kind: TokenKind, sub: Uuid, sid: Option<Uuid>, ttl: Duration) -> (String, Claims) {
        let now = Utc::now();
        let claims = Claims {
            sub,
            kind,
            sid,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let keyset = self.keyset();
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(keyset.active.kid.clone());
        let token = encode(&header, &claims, &keyset.active.encoding)
            .expect("HS256 encoding of serializable claims cannot fail");
        (token, claims)
    }

    pub fn mint_access(&self, principal_id: Uuid, session_id: Uuid) -> (String, Claims) {
        self.mint(TokenKind::Access, principal_id, Some(session_id), self.access_ttl)
    }

    /// Refresh tokens carry the session id too, so a refreshed access
    /// token resumes the same session.
    pub fn mint_refresh(&self, principal_id: Uuid, session_id: Uuid) -> (String, Claims) {
        self.mint(TokenKind::Refresh, principal_id, Some(session_id), self.refresh_ttl)
    }

    /// Temp token for the 2FA interstitial.
    pub fn mint_staging(&self, principal_id: Uuid) -> (String, Claims) {
        self.mint(TokenKind::TwofaStaging, principal_id, None, self.staging_ttl)
    }

    /// One-shot token for the password reset flow. Not session-bound;
    /// the TTL comes from the caller because reset links have their own
    /// lifetime policy.
    pub fn mint_reset(&self, principal_id: Uuid, ttl: Duration) -> (String, Claims) {
        self.mint(TokenKind::PasswordReset, principal_id, None, ttl)
    }

    /// Mint any kind with an explicit TTL; lets tests build expired
    /// tokens.
    pub fn mint_with_ttl(
        &self,
        kind: TokenKind,
        principal_id: Uuid,
        session_id: Option<Uuid>,
        ttl: Duration,
    ) -> (String, Claims) {
        self.mint(kind, principal_id, session_id, ttl)
    }

    /// Validate and decode a token, enforcing the expected kind.
    pub fn parse(&self, raw: &str, expected_kind: TokenKind) -> Result<Claims, TokenError> {
        let header = decode_header(raw).map_err(|_| TokenError::Malformed)?;

        let keyset = self.keyset();
        let mut candidates: Vec<&KeyMaterial> = Vec::with_capacity(2);
        match header.kid.as_deref() {
            Some(kid) if kid == keyset.active.kid => candidates.push(&keyset.active),
            Some(kid) => {
                if let Some((prev, rotated_at)) = &keyset.previous {
                    if kid == prev.kid && Utc::now() < *rotated_at + self.access_ttl {
                        candidates.push(prev);
                    }
                }
            }
            // No kid: try active, then previous within grace.
            None => {
                candidates.push(&keyset.active);
                if let Some((prev, rotated_at)) = &keyset.previous {
                    if Utc::now() < *rotated_at + self.access_ttl {
                        candidates.push(prev);
                    }
                }
            }
        }
        if candidates.is_empty() {
            return Err(TokenError::BadSignature);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECONDS;
        validation.validate_exp = true;

        let mut last_err = TokenError::BadSignature;
        for key in candidates {
            match decode::<Claims>(raw, &key.decoding, &validation) {
                Ok(data) => {
                    if data.claims.kind != expected_kind {
                        return Err(TokenError::WrongKind);
                    }
                    return Ok(data.claims);
                }
                Err(e) => {
                    last_err = match e.kind() {
                        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                        jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                            TokenError::BadSignature
                        }
                        _ => TokenError::Malformed,
                    };
                }
            }
        }
        Err(last_err)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Add a refresh-token jti to the revocation set. The entry lives
    /// until the token's own expiry.
    pub fn revoke(&self, jti: &str, exp: i64) {
        if self.revoked.len() >= REVOCATION_SOFT_CAP {
            let now = Utc::now().timestamp();
            self.revoked.retain(|_, entry_exp| *entry_exp > now);
        }
        self.revoked.insert(jti.to_string(), exp);
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        match self.revoked.get(jti) {
            Some(exp) => *exp > Utc::now().timestamp() - LEEWAY_SECONDS as i64,
            None => false,
        }
    }

    /// Best-effort prune of expired revocation entries.
    pub fn prune_revocations(&self) {
        let now = Utc::now().timestamp();
        self.revoked.retain(|_, exp| *exp > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> TokenService {
        TokenService::new(&JwtConfig {
            secret: "a-test-secret-that-is-long-enough-0123".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 7,
            staging_token_expiry_minutes: 5,
        })
    }

    #[test]
    fn mint_and_parse_access_token() {
        let svc = test_service();
        let principal = Uuid::new_v4();
        let session = Uuid::new_v4();

        let (raw, minted) = svc.mint_access(principal, session);
        let claims = svc.parse(&raw, TokenKind::Access).expect("valid token");

        assert_eq!(claims.sub, principal);
        assert_eq!(claims.sid, Some(session));
        assert_eq!(claims.jti, minted.jti);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn kind_isolation() {
        let svc = test_service();
        let principal = Uuid::new_v4();

        let kinds = [
            TokenKind::Access,
            TokenKind::Refresh,
            TokenKind::TwofaStaging,
            TokenKind::PasswordReset,
            TokenKind::EmailVerify,
        ];
        for mint_kind in kinds {
            let (raw, _) = svc.mint_with_ttl(mint_kind, principal, None, Duration::minutes(5));
            for parse_kind in kinds {
                let result = svc.parse(&raw, parse_kind);
                if parse_kind == mint_kind {
                    assert!(result.is_ok());
                } else {
                    assert_eq!(result.unwrap_err(), TokenError::WrongKind);
                }
            }
        }
    }

    #[test]
    fn reset_token_is_unbound_and_kind_checked() {
        let svc = test_service();
        let principal = Uuid::new_v4();

        let (raw, _) = svc.mint_reset(principal, Duration::minutes(15));
        let claims = svc.parse(&raw, TokenKind::PasswordReset).expect("valid token");
        assert_eq!(claims.sub, principal);
        assert_eq!(claims.sid, None);

        // A reset link must never open the gate or refresh a session.
        assert_eq!(svc.parse(&raw, TokenKind::Access).unwrap_err(), TokenError::WrongKind);
        assert_eq!(svc.parse(&raw, TokenKind::Refresh).unwrap_err(), TokenError::WrongKind);
    }

    #[test]
    fn expiry_honours_clock_with_leeway() {
        let svc = test_service();
        let principal = Uuid::new_v4();

        // Expired two minutes ago: outside the 30s leeway.
        let (raw, _) = svc.mint_with_ttl(TokenKind::Access, principal, None, Duration::minutes(-2));
        assert_eq!(svc.parse(&raw, TokenKind::Access).unwrap_err(), TokenError::Expired);

        // Expired ten seconds ago: inside the leeway, still accepted.
        let (raw, _) =
            svc.mint_with_ttl(TokenKind::Access, principal, None, Duration::seconds(-10));
        assert!(svc.parse(&raw, TokenKind::Access).is_ok());
    }

    #[test]
    fn tampering_is_rejected() {
        let svc = test_service();
        let (raw, _) = svc.mint_access(Uuid::new_v4(), Uuid::new_v4());

        // Flip a character in the signature segment.
        let mut tampered = raw.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        let err = svc.parse(&tampered, TokenKind::Access).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature | TokenError::Malformed));

        // Garbage is malformed.
        assert_eq!(
            svc.parse("not-a-jwt", TokenKind::Access).unwrap_err(),
            TokenError::Malformed
        );

        // Body tampering breaks the signature.
        let parts: Vec<&str> = raw.split('.').collect();
        let forged = format!("{}.eyJzdWIiOiJ4In0.{}", parts[0], parts[2]);
        let err = svc.parse(&forged, TokenKind::Access).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature | TokenError::Malformed));
    }

    #[test]
    fn rotation_keeps_grace_window() {
        let svc = test_service();
        let principal = Uuid::new_v4();
        let session = Uuid::new_v4();

        let (old_token, _) = svc.mint_access(principal, session);
        svc.rotate(b"another-secret-that-is-long-enough-456");

        // Token minted before rotation still parses within its TTL.
        assert!(svc.parse(&old_token, TokenKind::Access).is_ok());

        // Tokens minted after rotation use the new key.
        let (new_token, _) = svc.mint_access(principal, session);
        assert!(svc.parse(&new_token, TokenKind::Access).is_ok());
    }

    #[test]
    fn revocation_set_tracks_jti_until_expiry() {
        let svc = test_service();
        let (_, claims) = svc.mint_refresh(Uuid::new_v4(), Uuid::new_v4());

        assert!(!svc.is_revoked(&claims.jti));
        svc.revoke(&claims.jti, claims.exp);
        assert!(svc.is_revoked(&claims.jti));

        // Entries already past expiry are pruned.
        svc.revoke("stale", Utc::now().timestamp() - 3600);
        svc.prune_revocations();
        assert!(!svc.is_revoked("stale"));
        assert!(svc.is_revoked(&claims.jti));
    }
}
