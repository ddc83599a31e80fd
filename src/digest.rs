use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

pub const DIGEST_LEN: usize = 32;

pub type Digest = [u8; DIGEST_LEN];

/// Hash function applied to each candidate encoding.
pub trait Digester: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> Digest;
}

/// SHA-256, what the challenge verifier recomputes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digester;

impl Digester for Sha256Digester {
    fn digest(&self, bytes: &[u8]) -> Digest {
        let out = sha2::Sha256::digest(bytes);
        let mut d = [0u8; DIGEST_LEN];
        d.copy_from_slice(&out);
        d
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Digester;

impl Digester for Blake3Digester {
    fn digest(&self, bytes: &[u8]) -> Digest {
        blake3::hash(bytes).into()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn digester(self) -> Box<dyn Digester> {
        match self {
            HashAlgorithm::Sha256 => Box::new(Sha256Digester),
            HashAlgorithm::Blake3 => Box::new(Blake3Digester),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm '{other}'")),
        }
    }
}
