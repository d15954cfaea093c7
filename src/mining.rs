// src/mining.rs
//
// Mining state as observed from the device, and host-side nonce verification.
// The state is a pure fold over classified protocol events.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::io::miner::ProtocolEvent;

// ============================================================================
// Hash Algorithm
// ============================================================================

/// Hash algorithm the firmware mines with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Keccak256,
}

/// The firmware boots with Keccak-256
impl Default for HashAlgorithm {
    fn default() -> Self {
        HashAlgorithm::Keccak256
    }
}

impl HashAlgorithm {
    /// Parse either the command keyword (`sha256`, `keccak256`, `keccak`) or the
    /// display name the firmware reports (`SHA256`, `Keccak-256`)
    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("sha256") {
            Some(HashAlgorithm::Sha256)
        } else if s.eq_ignore_ascii_case("keccak256")
            || s.eq_ignore_ascii_case("keccak")
            || s.eq_ignore_ascii_case("keccak-256")
        {
            Some(HashAlgorithm::Keccak256)
        } else {
            None
        }
    }

    /// Argument used by the `hash` command
    pub fn keyword(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Keccak256 => "keccak256",
        }
    }

    /// Name as printed by the firmware
    pub fn display_name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Keccak256 => "Keccak-256",
        }
    }

    fn digest(&self, entropy: u8, nonce: u32) -> [u8; 32] {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(entropy.to_be_bytes());
                hasher.update(nonce.to_le_bytes());
                hasher.finalize().into()
            }
            HashAlgorithm::Keccak256 => {
                let mut hasher = Keccak256::new();
                hasher.update(entropy.to_be_bytes());
                hasher.update(nonce.to_le_bytes());
                hasher.finalize().into()
            }
        }
    }
}

/// Recompute the firmware's proof of work for a reported nonce.
///
/// The firmware hashes the entropy byte followed by the little-endian nonce and
/// requires the first `zeros` bytes of the digest to be zero. Returns `None`
/// when a parameter is outside what the firmware can have mined with.
pub fn verify_nonce(algorithm: HashAlgorithm, zeros: u32, entropy: u32, nonce: i64) -> Option<bool> {
    let zeros = u8::try_from(zeros).ok()? as usize;
    let entropy = u8::try_from(entropy).ok()?;
    let nonce = u32::try_from(nonce).ok()?;

    if zeros > 32 {
        return Some(false);
    }
    let hash = algorithm.digest(entropy, nonce);
    Some(hash[..zeros].iter().all(|&b| b == 0))
}

// ============================================================================
// Device State
// ============================================================================

/// Latest known device/mining state.
///
/// Only changed by [`DeviceState::apply`], except for the `is_mining` flag which
/// the session clears on disconnect and on a local stop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub zeros: u32,
    pub entropy: u32,
    /// -1 until the device reports a nonce
    pub last_nonce: i64,
    pub is_mining: bool,
    /// None until the device reports its algorithm
    pub hash_algorithm: Option<HashAlgorithm>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            zeros: 0,
            entropy: 0,
            last_nonce: -1,
            is_mining: false,
            hash_algorithm: None,
        }
    }
}

/// Fields changed by one event. `None` means unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StateDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zeros: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entropy: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_nonce: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mining: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<Option<HashAlgorithm>>,
}

impl StateDelta {
    pub fn between(before: &DeviceState, after: &DeviceState) -> Self {
        fn changed<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
            (a != b).then(|| b.clone())
        }

        StateDelta {
            zeros: changed(&before.zeros, &after.zeros),
            entropy: changed(&before.entropy, &after.entropy),
            last_nonce: changed(&before.last_nonce, &after.last_nonce),
            is_mining: changed(&before.is_mining, &after.is_mining),
            hash_algorithm: changed(&before.hash_algorithm, &after.hash_algorithm),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == StateDelta::default()
    }
}

impl DeviceState {
    /// Fold one event into the state and report what changed
    pub fn apply(&mut self, event: &ProtocolEvent) -> StateDelta {
        let before = self.clone();

        match event {
            ProtocolEvent::ZerosUpdated(n) => self.zeros = *n,
            ProtocolEvent::EntropyUpdated(n) => self.entropy = *n,
            ProtocolEvent::MiningStarted => self.is_mining = true,
            ProtocolEvent::MiningResult(nonce) => {
                self.is_mining = false;
                if let Some(nonce) = nonce {
                    self.last_nonce = *nonce;
                }
            }
            ProtocolEvent::DeviceReset => {
                *self = DeviceState::default();
            }
            ProtocolEvent::HashAlgorithmReported(algorithm) => {
                self.hash_algorithm = Some(*algorithm);
            }
            ProtocolEvent::MiningProgress(_)
            | ProtocolEvent::DeviceError(_)
            | ProtocolEvent::Unclassified(_) => {}
        }

        StateDelta::between(&before, self)
    }

    /// Fold a sequence of events starting from the default state
    pub fn fold<'a>(events: impl IntoIterator<Item = &'a ProtocolEvent>) -> Self {
        let mut state = DeviceState::default();
        for event in events {
            state.apply(event);
        }
        state
    }
}

// ============================================================================
// Tests
// ============================================================================
