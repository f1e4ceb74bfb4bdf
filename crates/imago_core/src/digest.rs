//! Incremental multi-algorithm digesting of the imaged byte stream.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 3] = [Self::Md5, Self::Sha1, Self::Sha256];

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!(
                "unknown digest algorithm '{other}' (expected md5, sha1 or sha256)"
            )),
        }
    }
}

enum HasherState {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl HasherState {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(hasher) => hasher.update(data),
            Self::Sha1(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(hasher) => hex::encode(hasher.finalize()),
            Self::Sha1(hasher) => hex::encode(hasher.finalize()),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Folds a byte stream through a configured set of hash algorithms.
///
/// Update order is the caller's responsibility: the engine always feeds
/// blocks in release (write) order so the resulting digests are
/// independent of read scheduling.
pub struct DigestAccumulator {
    hashers: Vec<(DigestAlgorithm, HasherState)>,
}

impl DigestAccumulator {
    /// Duplicate algorithms are folded once; order of first appearance is
    /// kept for the final report.
    pub fn new(algorithms: &[DigestAlgorithm]) -> Self {
        let mut hashers: Vec<(DigestAlgorithm, HasherState)> = Vec::new();
        for &algorithm in algorithms {
            if hashers.iter().all(|(existing, _)| *existing != algorithm) {
                hashers.push((algorithm, HasherState::new(algorithm)));
            }
        }
        Self { hashers }
    }

    pub fn update(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
    }

    pub fn finalize(self) -> DigestReport {
        DigestReport {
            entries: self
                .hashers
                .into_iter()
                .map(|(algorithm, hasher)| (algorithm, hasher.finalize_hex()))
                .collect(),
        }
    }
}

/// Final digests of one byte stream, hex-encoded per algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestReport {
    entries: Vec<(DigestAlgorithm, String)>,
}

impl DigestReport {
    pub fn entries(&self) -> &[(DigestAlgorithm, String)] {
        &self.entries
    }

    pub fn get(&self, algorithm: DigestAlgorithm) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == algorithm)
            .map(|(_, hex)| hex.as_str())
    }
}

impl fmt::Display for DigestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (algorithm, hex)) in self.entries.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", algorithm.display_name(), hex)?;
        }
        Ok(())
    }
}
