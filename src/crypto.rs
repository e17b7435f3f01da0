/// EVM key handling: key generation, address derivation and hash signing.
///
/// Implements:
/// - secp256k1 key generation and loading
/// - keccak256 address derivation with EIP-55 checksums
/// - recoverable signatures over 32-byte hashes (r || s || v, v = 27 + recovery id)
/// - EIP-191 personal message signing
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

use crate::errors::CdpError;

/// Signs on behalf of an account. Owners of smart accounts implement this.
pub trait Signer: Send + Sync {
    /// EIP-55 checksummed address.
    fn address(&self) -> String;
    /// Sign a 32-byte hash, returning 65 bytes `r || s || v`.
    fn sign_hash(&self, hash: &[u8; 32]) -> Result<[u8; 65], CdpError>;
}

/// A secp256k1 key held in process memory.
#[derive(Clone)]
pub struct LocalAccount {
    secret_key: SecretKey,
    address: [u8; 20],
}

impl std::fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &to_checksum_address(&self.address))
            .finish_non_exhaustive()
    }
}

impl LocalAccount {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let (secret_key, public_key) = secp.generate_keypair(&mut rng);
        Self {
            secret_key,
            address: address_from_pubkey(&public_key.serialize_uncompressed()),
        }
    }

    pub fn from_private_key(private_key: &[u8; 32]) -> Result<Self, CdpError> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|e| CdpError::CryptoError(format!("Invalid private key: {e}")))?;
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self {
            secret_key,
            address: address_from_pubkey(&public_key.serialize_uncompressed()),
        })
    }

    /// Load from a `0x`-prefixed (or bare) hex private key.
    pub fn from_hex(private_key: &str) -> Result<Self, CdpError> {
        Self::from_private_key(&parse_hex_32(private_key)?)
    }

    pub fn address_bytes(&self) -> &[u8; 20] {
        &self.address
    }

    pub fn private_key(&self) -> [u8; 32] {
        self.secret_key.secret_bytes()
    }

    /// EIP-191 `personal_sign`.
    pub fn sign_message(&self, message: &[u8]) -> Result<[u8; 65], CdpError> {
        self.sign_hash(&hash_message(message))
    }
}

impl Signer for LocalAccount {
    fn address(&self) -> String {
        to_checksum_address(&self.address)
    }

    fn sign_hash(&self, hash: &[u8; 32]) -> Result<[u8; 65], CdpError> {
        sign_hash(&self.secret_key, hash)
    }
}

/// Sign a digest. libsecp256k1 always produces low-s signatures.
fn sign_hash(secret_key: &SecretKey, digest: &[u8; 32]) -> Result<[u8; 65], CdpError> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*digest);
    let signature = secp.sign_ecdsa_recoverable(&message, secret_key);
    let (rec_id, compact) = signature.serialize_compact();
    let recovery_id = u8::try_from(rec_id.to_i32())
        .map_err(|e| CdpError::CryptoError(format!("Invalid recovery id: {e}")))?;

    let mut result = [0u8; 65];
    result[0..64].copy_from_slice(&compact);
    result[64] = 27 + recovery_id;
    Ok(result)
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// EIP-191 digest: keccak256("\x19Ethereum Signed Message:\n" + len + message).
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Derive an EVM address from a public key (65 bytes, 0x04 prefix).
pub fn address_from_pubkey(public_key: &[u8; 65]) -> [u8; 20] {
    let hash = Keccak256::digest(&public_key[1..65]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    addr
}

/// EIP-55 mixed-case checksum encoding.
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a 20-byte hex address. Case is not validated.
pub fn parse_address(s: &str) -> Result<[u8; 20], CdpError> {
    let hex_part = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex_part)
        .map_err(|e| CdpError::UserInputValidation(format!("Invalid address {s}: {e}")))?;
    if bytes.len() != 20 {
        return Err(CdpError::UserInputValidation(format!(
            "Invalid address {s}: expected 20 bytes, got {}",
            bytes.len()
        )));
    }
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok(result)
}

/// Format bytes as a "0x"-prefixed hex string.
pub fn to_hex_string(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode a "0x"-prefixed (or bare) hex string.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, CdpError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| CdpError::CryptoError(format!("Invalid hex: {e}")))
}

/// Parse a "0x"-prefixed hex string into a 32-byte array.
pub fn parse_hex_32(s: &str) -> Result<[u8; 32], CdpError> {
    let bytes = decode_hex(s)?;
    if bytes.len() != 32 {
        return Err(CdpError::CryptoError(format!(
            "Expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut result = [0u8; 32];
    result.copy_from_slice(&bytes);
    Ok(result)
}
