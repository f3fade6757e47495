//! Proof requests and the results an engine hands back for them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ProverError, ProverResult};

/// Hash function whose trace is proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    Keccak,
    Sha2,
    Sha3,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Keccak => "keccak",
            HashKind::Sha2 => "sha2",
            HashKind::Sha3 => "sha3",
        }
    }

    /// The result slot jobs of this kind write into.
    ///
    /// SHA-2 and SHA-3 share one input and one output, so they share a slot.
    pub fn slot(&self) -> ResultSlot {
        match self {
            HashKind::Keccak => ResultSlot::KeccakBatch,
            HashKind::Sha2 | HashKind::Sha3 => ResultSlot::SharedDigest,
        }
    }

    /// Whether this kind takes a batch of inputs rather than a single string.
    pub fn is_batched(&self) -> bool {
        matches!(self, HashKind::Keccak)
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = ProverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keccak" | "keccak256" | "keccak-256" => Ok(HashKind::Keccak),
            "sha2" | "sha256" | "sha-256" => Ok(HashKind::Sha2),
            "sha3" | "sha3-256" => Ok(HashKind::Sha3),
            other => Err(ProverError::InvalidRequest(format!(
                "unknown hash kind '{other}'"
            ))),
        }
    }
}

/// Output slot a job writes into. Two jobs conflict iff they share a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSlot {
    KeccakBatch,
    SharedDigest,
}

impl fmt::Display for ResultSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSlot::KeccakBatch => f.write_str("keccak-batch"),
            ResultSlot::SharedDigest => f.write_str("shared-digest"),
        }
    }
}

/// Request payload: a batch of numeric strings or one arbitrary string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Batch(Vec<String>),
    Single(String),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Batch(values) => values.len(),
            Payload::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A validated, immutable proof request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    kind: HashKind,
    payload: Payload,
}

impl ProofRequest {
    /// Build a request, checking that the payload shape matches the kind.
    ///
    /// Batched requests need at least one element. Single-string requests
    /// accept anything, including the empty string; whether the value is a
    /// valid field element is for the engine to decide.
    pub fn new(kind: HashKind, payload: Payload) -> ProverResult<Self> {
        match (&payload, kind.is_batched()) {
            (Payload::Batch(values), true) if values.is_empty() => Err(
                ProverError::InvalidRequest(format!("{kind} request needs at least one input")),
            ),
            (Payload::Batch(_), true) | (Payload::Single(_), false) => {
                Ok(ProofRequest { kind, payload })
            }
            (Payload::Single(_), true) => Err(ProverError::InvalidRequest(format!(
                "{kind} takes a batch of inputs, got a single value"
            ))),
            (Payload::Batch(_), false) => Err(ProverError::InvalidRequest(format!(
                "{kind} takes a single input, got a batch"
            ))),
        }
    }

    pub fn keccak<I, S>(inputs: I) -> ProverResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            HashKind::Keccak,
            Payload::Batch(inputs.into_iter().map(Into::into).collect()),
        )
    }

    pub fn sha2(input: impl Into<String>) -> ProverResult<Self> {
        Self::new(HashKind::Sha2, Payload::Single(input.into()))
    }

    pub fn sha3(input: impl Into<String>) -> ProverResult<Self> {
        Self::new(HashKind::Sha3, Payload::Single(input.into()))
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn slot(&self) -> ResultSlot {
        self.kind.slot()
    }

    /// SHA-256 fingerprint of the payload, for records.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.payload).unwrap_or_default();
        crate::sha256_hex(&bytes)
    }
}

/// SHA-3 output: the digest plus engine artifacts passed through unexamined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptOutput {
    pub digest: String,
    pub transcript: String,
    pub advice: String,
}

/// Kind-specific value produced by a successful proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofValue {
    Digests(Vec<String>),
    Digest(String),
    Transcript(TranscriptOutput),
}

/// Status of one position in a batched result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus<'a> {
    Ready(&'a str),
    /// The engine left this slot empty; its computation did not complete.
    Pending,
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResult {
    pub kind: HashKind,
    pub value: ProofValue,
}

impl ProofResult {
    pub fn new(kind: HashKind, value: ProofValue) -> Self {
        ProofResult { kind, value }
    }

    /// All digests in input order (one for single-input kinds).
    pub fn digests(&self) -> Vec<&str> {
        match &self.value {
            ProofValue::Digests(values) => values.iter().map(String::as_str).collect(),
            ProofValue::Digest(digest) => vec![digest.as_str()],
            ProofValue::Transcript(out) => vec![out.digest.as_str()],
        }
    }

    /// The single digest, if this result carries exactly one.
    pub fn digest(&self) -> Option<&str> {
        match &self.value {
            ProofValue::Digests(_) => None,
            ProofValue::Digest(digest) => Some(digest),
            ProofValue::Transcript(out) => Some(&out.digest),
        }
    }

    /// Transcript and advice, present for SHA-3 results only.
    pub fn auxiliary(&self) -> Option<(&str, &str)> {
        match &self.value {
            ProofValue::Transcript(out) => Some((&out.transcript, &out.advice)),
            _ => None,
        }
    }

    pub fn slots(&self) -> Vec<SlotStatus<'_>> {
        self.digests()
            .into_iter()
            .map(|d| {
                if d.is_empty() {
                    SlotStatus::Pending
                } else {
                    SlotStatus::Ready(d)
                }
            })
            .collect()
    }

    /// True when no slot is left pending.
    pub fn is_complete(&self) -> bool {
        self.slots()
            .iter()
            .all(|s| matches!(s, SlotStatus::Ready(_)))
    }
}
