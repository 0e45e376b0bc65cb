// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Hashing and Ed25519 signatures as consumed by the chain.
//!
//! A secret phrase maps to an Ed25519 seed as `SHA-256(phrase)`. Seeds and phrases are
//! zeroized as soon as the key pair has been built.

use ring::{
    digest,
    rand::{SecureRandom, SystemRandom},
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::types::{PublicKey, Signature};

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Seed was rejected by the Ed25519 implementation.
    #[error("invalid key")]
    InvalidKey,
    /// System randomness failed.
    #[error("rng")]
    Rng,
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let d = digest::digest(&digest::SHA256, data);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// SHA-256 over the concatenation of `parts`.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut ctx = digest::Context::new(&digest::SHA256);
    for p in parts {
        ctx.update(p);
    }
    let d = ctx.finish();
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    out
}

/// Double SHA-256, used for proof-of-work hashing.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// A secret phrase; wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretPhrase(String);

impl SecretPhrase {
    /// Wrap a phrase.
    pub fn new(phrase: impl Into<String>) -> Self {
        Self(phrase.into())
    }

    /// Generate a fresh random phrase (64 hex chars of system randomness).
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let mut raw = [0u8; 32];
        rng.fill(&mut raw).map_err(|_| CryptoError::Rng)?;
        let phrase = hex::encode(raw);
        raw.zeroize();
        Ok(Self(phrase))
    }

    /// The phrase text.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn keypair(&self) -> Result<Ed25519KeyPair, CryptoError> {
        let mut seed = sha256(self.0.as_bytes());
        let kp = Ed25519KeyPair::from_seed_unchecked(&seed).map_err(|_| CryptoError::InvalidKey);
        seed.zeroize();
        kp
    }

    /// Public key belonging to this phrase.
    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        let kp = self.keypair()?;
        PublicKey::from_slice(kp.public_key().as_ref()).ok_or(CryptoError::InvalidKey)
    }

    /// Sign `msg`.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature, CryptoError> {
        let kp = self.keypair()?;
        let sig = kp.sign(msg);
        Signature::from_slice(sig.as_ref()).ok_or(CryptoError::InvalidKey)
    }
}

impl std::fmt::Debug for SecretPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretPhrase(<redacted>)")
    }
}

/// Verify an Ed25519 signature.
pub fn verify(signature: &Signature, msg: &[u8], public_key: &PublicKey) -> bool {
    let pk = UnparsedPublicKey::new(&ED25519, public_key.as_bytes());
    pk.verify(msg, signature.as_bytes()).is_ok()
}

/// Constant-time public key comparison.
pub fn keys_equal(a: &PublicKey, b: &PublicKey) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let secret = SecretPhrase::new("correct horse battery staple");
        let pk = secret.public_key().unwrap();
        let sig = secret.sign(b"payload").unwrap();
        assert!(verify(&sig, b"payload", &pk));
        assert!(!verify(&sig, b"other payload", &pk));
    }

    #[test]
    fn same_phrase_same_key() {
        let a = SecretPhrase::new("x").public_key().unwrap();
        let b = SecretPhrase::new("x").public_key().unwrap();
        let c = SecretPhrase::new("y").public_key().unwrap();
        assert!(keys_equal(&a, &b));
        assert!(!keys_equal(&a, &c));
    }
}
