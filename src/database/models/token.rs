use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::validator::Validator;

/// Characters of the RFC 4648 base32 alphabet; plaintext tokens use only these.
const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
pub const TOKEN_LENGTH: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: Vec<u8>,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    /// Draws 26 characters from the base32 alphabet (130 bits of entropy).
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Self {
        let mut rng = rand::thread_rng();
        let plaintext: String = (0..TOKEN_LENGTH)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();

        Self {
            hash: hash_plaintext(&plaintext),
            plaintext,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }
}

pub fn hash_plaintext(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

/// Cheap shape check run before any store lookup.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(plaintext.len() == TOKEN_LENGTH, "token", "must be 26 bytes long");
    v.check(
        plaintext.bytes().all(|b| TOKEN_ALPHABET.contains(&b)),
        "token",
        "must only contain base32 characters",
    );
}
