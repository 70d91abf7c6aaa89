//! Signing primitives for reward claims.
//!
//! Reward signers attest off-chain computed period rewards with secp256k1
//! ECDSA over a SHA256 digest. Keys and signatures travel as hex strings.

use secp256k1::{
    ecdsa::Signature as Secp256k1Signature, Message, PublicKey as Secp256k1PubKey, Secp256k1,
    SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::{HASH_LENGTH, PUBKEY_LENGTH, SIGNATURE_LENGTH};

// ═══════════════════════════════════════════════════════════════════════════════
// SECP256K1 CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

thread_local! {
    static SECP: Secp256k1<secp256k1::All> = Secp256k1::new();
}

fn with_secp<F, R>(f: F) -> R
where
    F: FnOnce(&Secp256k1<secp256k1::All>) -> R,
{
    SECP.with(|secp| f(secp))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEX ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

fn decode_fixed<const N: usize>(s: &str, name: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s).map_err(|e| Error::InvalidParameter {
        name: name.into(),
        reason: e.to_string(),
    })?;
    fixed_from_slice(&bytes, name)
}

fn fixed_from_slice<const N: usize>(slice: &[u8], name: &str) -> Result<[u8; N]> {
    if slice.len() != N {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("expected {} bytes, got {}", N, slice.len()),
        });
    }
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(slice);
    Ok(bytes)
}

macro_rules! hex_serde {
    ($ty:ident, $name:literal) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                decode_fixed(&s, $name).map($ty).map_err(serde::de::Error::custom)
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// HASH
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte SHA256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; HASH_LENGTH]);

hex_serde!(Hash, "hash");

impl Hash {
    /// Create a new hash from bytes
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Compute SHA256 hash of data
    pub fn sha256(data: &[u8]) -> Self {
        let mut bytes = [0u8; HASH_LENGTH];
        bytes.copy_from_slice(&Sha256::digest(data));
        Self(bytes)
    }

    /// SHA256 of `tag:data`, separating message kinds that share a layout
    pub fn tagged(tag: &str, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tag.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        let mut bytes = [0u8; HASH_LENGTH];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed(s, "hash").map(Self)
    }

    fn to_message(self) -> Message {
        Message::from_digest(self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIVATE KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Private key length in bytes
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// A secp256k1 signing key held by a reward signer
#[derive(Clone)]
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    /// Create a private key from bytes
    pub fn from_bytes(bytes: &[u8; PRIVATE_KEY_LENGTH]) -> Result<Self> {
        let inner = SecretKey::from_slice(bytes).map_err(|e| Error::CryptoError {
            operation: "private_key_from_bytes".into(),
            details: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Generate a new random private key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            inner: SecretKey::new(&mut rng),
        }
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        with_secp(|secp| PublicKey(Secp256k1PubKey::from_secret_key(secp, &self.inner).serialize()))
    }

    /// Sign a message hash
    pub fn sign(&self, message: &Hash) -> Signature {
        with_secp(|secp| {
            let sig = secp.sign_ecdsa(&message.to_message(), &self.inner);
            Signature(sig.serialize_compact())
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// A compressed secp256k1 public key (33 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBKEY_LENGTH]);

hex_serde!(PublicKey, "public_key");

impl PublicKey {
    /// Parse and validate a public key from bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes = fixed_from_slice(slice, "public_key")?;
        Secp256k1PubKey::from_slice(&bytes).map_err(|e| Error::CryptoError {
            operation: "public_key_parse".into(),
            details: e.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Parse and validate from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes: [u8; PUBKEY_LENGTH] = decode_fixed(s, "public_key")?;
        Self::from_slice(&bytes)
    }

    /// Get the public key as bytes
    pub fn as_bytes(&self) -> &[u8; PUBKEY_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify a signature over `message`; malformed keys or signatures fail
    pub fn verify(&self, message: &Hash, signature: &Signature) -> bool {
        let (Ok(pk), Ok(sig)) = (
            Secp256k1PubKey::from_slice(&self.0),
            Secp256k1Signature::from_compact(&signature.0),
        ) else {
            return false;
        };
        with_secp(|secp| secp.verify_ecdsa(&message.to_message(), &sig, &pk).is_ok())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════════

/// A compact ECDSA signature (64 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

hex_serde!(Signature, "signature");

impl Signature {
    /// Create a signature from bytes
    pub fn new(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the signature as bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed(s, "signature").map(Self)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[byte; PRIVATE_KEY_LENGTH]).unwrap()
    }

    #[test]
    fn test_hash_sha256() {
        let hash = Hash::sha256(b"hello world");
        let expected =
            Hash::from_hex("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_tagged_hash_separates_tags() {
        assert_ne!(Hash::tagged("a", b"data"), Hash::tagged("b", b"data"));
        assert_ne!(Hash::tagged("a", b"data"), Hash::sha256(b"data"));
    }

    #[test]
    fn test_sign_verify() {
        let signer = key(0x11);
        let message = Hash::sha256(b"period 1");
        let signature = signer.sign(&message);

        assert!(signer.public_key().verify(&message, &signature));
        assert!(!signer.public_key().verify(&Hash::sha256(b"period 2"), &signature));
        assert!(!key(0x22).public_key().verify(&message, &signature));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let signer = key(0x11);
        let message = Hash::sha256(b"period 1");
        assert!(!signer.public_key().verify(&message, &Signature::new([0xff; SIGNATURE_LENGTH])));
    }

    #[test]
    fn test_zero_private_key_rejected() {
        assert!(matches!(
            PrivateKey::from_bytes(&[0u8; PRIVATE_KEY_LENGTH]),
            Err(Error::CryptoError { .. })
        ));
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(PrivateKey::generate().public_key(), PrivateKey::generate().public_key());
    }

    #[test]
    fn test_public_key_validation() {
        let pk = key(0x33).public_key();
        assert_eq!(PublicKey::from_hex(&pk.to_hex()).unwrap(), pk);
        assert!(PublicKey::from_slice(&[0x05; PUBKEY_LENGTH]).is_err());
        assert!(PublicKey::from_slice(&[0x02; 10]).is_err());
    }

    #[test]
    fn test_json_encoding() {
        let pk = key(0x44).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pk);

        let sig = key(0x44).sign(&Hash::sha256(b"x"));
        let back: Signature = serde_json::from_str(&serde_json::to_string(&sig).unwrap()).unwrap();
        assert_eq!(back, sig);
    }
}
