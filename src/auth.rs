/// Per-request bearer tokens for the CDP REST API.
///
/// API key secrets are Ed25519 keys, base64 encoded as either a 32-byte seed
/// or a 64-byte seed || public key. Each request gets a short-lived EdDSA JWT
/// bound to its method, host and path.
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{Signer as _, SigningKey};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::CdpError;

/// Token lifetime in seconds.
pub const JWT_EXPIRES_IN: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub kid: String,
    pub typ: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    pub nbf: u64,
    pub exp: u64,
    pub uris: Vec<String>,
}

/// Signs request tokens with an API key.
#[derive(Clone)]
pub struct ApiKeyAuth {
    key_id: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl ApiKeyAuth {
    pub fn new(key_id: impl Into<String>, key_secret: &str) -> Result<Self, CdpError> {
        let key_id = key_id.into();
        if key_id.is_empty() {
            return Err(CdpError::Config("API key id is empty".into()));
        }
        let secret = key_secret.trim();
        if secret.starts_with("-----BEGIN") {
            return Err(CdpError::Config(
                "Only Ed25519 API key secrets are supported".into(),
            ));
        }
        let bytes = STANDARD
            .decode(secret)
            .map_err(|e| CdpError::Config(format!("API key secret is not valid base64: {e}")))?;

        let mut seed = [0u8; 32];
        match bytes.len() {
            32 | 64 => seed.copy_from_slice(&bytes[..32]),
            n => {
                return Err(CdpError::Config(format!(
                    "Ed25519 key secret must be 32 or 64 bytes, got {n}"
                )))
            }
        }
        Ok(Self {
            key_id,
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// A token valid for `method host path` starting now.
    pub fn generate_jwt(&self, method: &str, host: &str, path: &str) -> Result<String, CdpError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CdpError::Other(format!("System clock error: {e}")))?
            .as_secs();
        self.generate_jwt_at(method, host, path, now)
    }

    pub fn generate_jwt_at(
        &self,
        method: &str,
        host: &str,
        path: &str,
        now: u64,
    ) -> Result<String, CdpError> {
        let header = JwtHeader {
            alg: "EdDSA".into(),
            kid: self.key_id.clone(),
            typ: "JWT".into(),
            nonce: nonce(),
        };
        let claims = JwtClaims {
            sub: self.key_id.clone(),
            iss: "cdp".into(),
            aud: vec!["cdp_service".into()],
            nbf: now,
            exp: now + JWT_EXPIRES_IN,
            uris: vec![format!("{} {}{}", method.to_uppercase(), host, path)],
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

fn nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
