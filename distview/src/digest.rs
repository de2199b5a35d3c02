use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("invalid digest format: {0}")]
    InvalidFormat(String),

    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid checksum digest length: {0}")]
    InvalidLength(String),

    #[error("content does not match digest {expected}: got {actual}")]
    Mismatch { expected: Digest, actual: Digest },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    fn hash(&self, bytes: &[u8]) -> String {
        match self {
            Algorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            Algorithm::Sha384 => format!("{:x}", Sha384::digest(bytes)),
            Algorithm::Sha512 => format!("{:x}", Sha512::digest(bytes)),
        }
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(DigestError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Content address of a blob, serialized as `algorithm:hex`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| DigestError::InvalidFormat(s.to_string()))?;
        let algorithm: Algorithm = algorithm.parse()?;

        if hex.len() != algorithm.hex_len() {
            return Err(DigestError::InvalidLength(s.to_string()));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(DigestError::InvalidFormat(s.to_string()));
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// The sha256 digest of `bytes`, the algorithm registries write by default.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::with_algorithm(Algorithm::Sha256, bytes)
    }

    pub fn with_algorithm(algorithm: Algorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            hex: algorithm.hash(bytes),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn verify(&self, bytes: &[u8]) -> Result<(), DigestError> {
        let actual = Self::with_algorithm(self.algorithm, bytes);
        if actual.hex != self.hex {
            return Err(DigestError::Mismatch {
                expected: self.clone(),
                actual,
            });
        }
        Ok(())
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str =
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_from_bytes() {
        assert_eq!(Digest::from_bytes(b"").to_string(), EMPTY_SHA256);
    }

    #[test]
    fn test_parse() {
        let digest = Digest::parse(EMPTY_SHA256).unwrap();
        assert_eq!(digest.algorithm(), Algorithm::Sha256);
        assert_eq!(digest.hex().len(), 64);
        assert_eq!(digest.to_string(), EMPTY_SHA256);

        assert!(matches!(
            Digest::parse("sha256"),
            Err(DigestError::InvalidFormat(_))
        ));
        assert!(matches!(
            Digest::parse("md5:d41d8cd98f00b204e9800998ecf8427e"),
            Err(DigestError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            Digest::parse("sha256:abc"),
            Err(DigestError::InvalidLength(_))
        ));
        let upper = EMPTY_SHA256.to_uppercase().replacen("SHA256", "sha256", 1);
        assert!(matches!(
            Digest::parse(&upper),
            Err(DigestError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_verify() {
        let digest = Digest::from_bytes(b"layer contents");
        assert!(digest.verify(b"layer contents").is_ok());
        assert!(matches!(
            digest.verify(b"tampered contents"),
            Err(DigestError::Mismatch { .. })
        ));

        let sha512 = Digest::with_algorithm(Algorithm::Sha512, b"layer contents");
        assert_eq!(sha512.hex().len(), 128);
        assert!(sha512.verify(b"layer contents").is_ok());
    }

    #[test]
    fn test_serde() {
        let json = format!("\"{EMPTY_SHA256}\"");
        let digest: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(serde_json::to_string(&digest).unwrap(), json);
        assert!(serde_json::from_str::<Digest>("\"sha256:nothex\"").is_err());
    }
}
