// src/io/miner/codec.rs
//
// Classification of device lines into protocol events.
// Rules are checked in a fixed order and the first match wins, so numeric
// parameter echoes are recognized before the looser mining markers.

use serde::Serialize;

use crate::io::serial::RawFrame;
use crate::mining::HashAlgorithm;

/// Banner printed by the firmware after a `reset` command
pub const RESET_BANNER: &str = "=== Reset Executado ===";

const ZEROS_PREFIX: &str = "ZEROS:";
const ENTROPY_PREFIX: &str = "ENTROPY:";
const MINE_START_MARKER: &str = "MINE_START:";
const MINE_RESULT_MARKERS: [&str; 2] = ["MINE_RESULT:", "FOUND:"];
const PROGRESS_PREFIXES: [&str; 2] = ["MINE_PROGRESS:", "MINING:"];
const HASH_PREFIXES: [&str; 2] = ["[HASH]", "[HASH_INFO]"];
const ERROR_PREFIXES: [&str; 4] = ["ZEROS_ERROR:", "ENTROPY_ERROR:", "MINE_ERROR:", "[HASH_ERROR]"];

/// Substrings after which a result line carries its nonce
const NONCE_MARKERS: [&str; 2] = ["encontrado:", "nonce="];
const PROGRESS_NONCE_MARKER: &str = "nonce=";

// ============================================================================
// Protocol Events
// ============================================================================

/// Meaning of one line received from the device
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProtocolEvent {
    ZerosUpdated(u32),
    EntropyUpdated(u32),
    MiningStarted,
    /// Mining finished; the nonce is absent when the line carried none we recognize
    MiningResult(Option<i64>),
    DeviceReset,
    /// Periodic progress report while mining
    MiningProgress(Option<i64>),
    HashAlgorithmReported(HashAlgorithm),
    /// The firmware rejected a command
    DeviceError(String),
    Unclassified(String),
}

impl ProtocolEvent {
    /// Short name for logs and console output
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::ZerosUpdated(_) => "zeros_updated",
            ProtocolEvent::EntropyUpdated(_) => "entropy_updated",
            ProtocolEvent::MiningStarted => "mining_started",
            ProtocolEvent::MiningResult(_) => "mining_result",
            ProtocolEvent::DeviceReset => "device_reset",
            ProtocolEvent::MiningProgress(_) => "mining_progress",
            ProtocolEvent::HashAlgorithmReported(_) => "hash_algorithm_reported",
            ProtocolEvent::DeviceError(_) => "device_error",
            ProtocolEvent::Unclassified(_) => "unclassified",
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classify a framed line. Lines that failed to decode are never matched.
pub fn classify(frame: &RawFrame) -> ProtocolEvent {
    if frame.decode_error {
        return ProtocolEvent::Unclassified(frame.text.clone());
    }
    classify_line(&frame.text)
}

/// Classify one line of device text
pub fn classify_line(line: &str) -> ProtocolEvent {
    let text = line.trim_end();
    let unclassified = || ProtocolEvent::Unclassified(text.to_string());

    if text.starts_with(ZEROS_PREFIX) {
        return parse_second_token(text)
            .map(ProtocolEvent::ZerosUpdated)
            .unwrap_or_else(unclassified);
    }

    if text.starts_with(ENTROPY_PREFIX) {
        return parse_second_token(text)
            .map(ProtocolEvent::EntropyUpdated)
            .unwrap_or_else(unclassified);
    }

    if text.contains(MINE_START_MARKER) {
        return ProtocolEvent::MiningStarted;
    }

    if MINE_RESULT_MARKERS.iter().any(|m| text.contains(m)) {
        let nonce = NONCE_MARKERS.iter().find_map(|m| nonce_after(text, m));
        return ProtocolEvent::MiningResult(nonce);
    }

    if text.starts_with(RESET_BANNER) {
        return ProtocolEvent::DeviceReset;
    }

    if PROGRESS_PREFIXES.iter().any(|p| text.starts_with(p)) {
        return ProtocolEvent::MiningProgress(nonce_after(text, PROGRESS_NONCE_MARKER));
    }

    if HASH_PREFIXES.iter().any(|p| text.starts_with(p)) {
        return text
            .rsplit(':')
            .next()
            .and_then(HashAlgorithm::from_name)
            .map(ProtocolEvent::HashAlgorithmReported)
            .unwrap_or_else(unclassified);
    }

    if ERROR_PREFIXES.iter().any(|p| text.starts_with(p)) {
        return ProtocolEvent::DeviceError(text.to_string());
    }

    unclassified()
}

/// `ZEROS: 5 zeros configurados` -> 5
fn parse_second_token(text: &str) -> Option<u32> {
    text.split_whitespace().nth(1)?.parse().ok()
}

/// Signed integer immediately following the last occurrence of `marker`
fn nonce_after(text: &str, marker: &str) -> Option<i64> {
    let start = text.rfind(marker)? + marker.len();
    let rest = text[start..].trim_start();

    let sign_len = usize::from(rest.starts_with(['+', '-']));
    let digits = rest[sign_len..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    rest[..sign_len + digits].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_and_entropy() {
        assert_eq!(classify_line("ZEROS: 5"), ProtocolEvent::ZerosUpdated(5));
        assert_eq!(
            classify_line("ZEROS: 3 zeros configurados"),
            ProtocolEvent::ZerosUpdated(3)
        );
        assert_eq!(
            classify_line("ENTROPY: 42 configurado\r"),
            ProtocolEvent::EntropyUpdated(42)
        );
    }

    #[test]
    fn test_bad_numbers_fall_back_to_unclassified() {
        assert_eq!(
            classify_line("ZEROS: many"),
            ProtocolEvent::Unclassified("ZEROS: many".into())
        );
        assert_eq!(
            classify_line("ENTROPY: -1"),
            ProtocolEvent::Unclassified("ENTROPY: -1".into())
        );
        assert_eq!(
            classify_line("ZEROS:"),
            ProtocolEvent::Unclassified("ZEROS:".into())
        );
    }

    #[test]
    fn test_mining_lines() {
        assert_eq!(classify_line("MINE_START: begin"), ProtocolEvent::MiningStarted);
        assert_eq!(
            classify_line("MINE_START: Iniciando mineração..."),
            ProtocolEvent::MiningStarted
        );
        assert_eq!(
            classify_line("MINE_RESULT: encontrado: 4821"),
            ProtocolEvent::MiningResult(Some(4821))
        );
        assert_eq!(
            classify_line("MINE_RESULT: Nonce encontrado: 123456"),
            ProtocolEvent::MiningResult(Some(123456))
        );
        assert_eq!(
            classify_line("FOUND: nonce=77, hash=[0, 0, 12]"),
            ProtocolEvent::MiningResult(Some(77))
        );
        assert_eq!(
            classify_line("MINE_RESULT: done"),
            ProtocolEvent::MiningResult(None)
        );
        assert_eq!(
            classify_line("MINE_RESULT: encontrado: -3"),
            ProtocolEvent::MiningResult(Some(-3))
        );
    }

    #[test]
    fn test_numeric_echo_wins_over_result_marker() {
        assert_eq!(
            classify_line("ZEROS: 2 FOUND: nonce=9"),
            ProtocolEvent::ZerosUpdated(2)
        );
    }

    #[test]
    fn test_reset_banner() {
        assert_eq!(classify_line(RESET_BANNER), ProtocolEvent::DeviceReset);
        assert_eq!(
            classify_line("=== Reset Executado === ok"),
            ProtocolEvent::DeviceReset
        );
    }

    #[test]
    fn test_progress_hash_and_errors() {
        assert_eq!(
            classify_line("MINING: nonce=1000, entropy=4"),
            ProtocolEvent::MiningProgress(Some(1000))
        );
        assert_eq!(
            classify_line("MINE_PROGRESS: working"),
            ProtocolEvent::MiningProgress(None)
        );
        assert_eq!(
            classify_line("[HASH] Algoritmo alterado para: SHA256"),
            ProtocolEvent::HashAlgorithmReported(HashAlgorithm::Sha256)
        );
        assert_eq!(
            classify_line("[HASH_INFO] Algoritmo atual: Keccak-256"),
            ProtocolEvent::HashAlgorithmReported(HashAlgorithm::Keccak256)
        );
        assert_eq!(
            classify_line("[HASH] Algoritmo alterado para: md5"),
            ProtocolEvent::Unclassified("[HASH] Algoritmo alterado para: md5".into())
        );
        assert_eq!(
            classify_line("ZEROS_ERROR: Valor inválido"),
            ProtocolEvent::DeviceError("ZEROS_ERROR: Valor inválido".into())
        );
        assert_eq!(
            classify_line("MINE_ERROR: Nenhum nonce encontrado"),
            ProtocolEvent::DeviceError("MINE_ERROR: Nenhum nonce encontrado".into())
        );
    }

    #[test]
    fn test_prefix_checks_are_case_sensitive() {
        assert_eq!(
            classify_line("zeros: 5"),
            ProtocolEvent::Unclassified("zeros: 5".into())
        );
        assert_eq!(
            classify_line("ESP32 Serial Comunicação iniciada!"),
            ProtocolEvent::Unclassified("ESP32 Serial Comunicação iniciada!".into())
        );
    }

    #[test]
    fn test_decode_error_frames_are_not_matched() {
        let frame = RawFrame {
            text: "ZEROS: 5".into(),
            decode_error: true,
        };
        assert_eq!(classify(&frame), ProtocolEvent::Unclassified("ZEROS: 5".into()));
    }

    #[test]
    fn test_event_json() {
        let json = serde_json::to_value(ProtocolEvent::MiningResult(Some(4821))).unwrap();
        assert_eq!(json["kind"], "mining_result");
        assert_eq!(json["value"], 4821);

        let json = serde_json::to_value(ProtocolEvent::MiningStarted).unwrap();
        assert_eq!(json["kind"], "mining_started");
    }
}
