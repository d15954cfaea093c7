// src/io/miner/commands.rs
//
// Commands understood by the miner firmware and their line encoding.

use serde::Serialize;

use crate::io::LinkError;
use crate::mining::HashAlgorithm;

const TERMINATOR: &str = "\n";

/// A user-issued instruction
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "command", content = "arg", rename_all = "snake_case")]
pub enum Command {
    Help,
    Info,
    Reset,
    Mine,
    /// Stops mining on the host side only. The firmware has no stop command.
    MineStop,
    SetZeros(u32),
    SetEntropy(u32),
    Hash(HashAlgorithm),
    /// Ask which algorithm is active
    HashInfo,
    /// Arbitrary single-line text, sent as typed
    Raw(String),
}

impl Command {
    /// Build `SetZeros` from user text, rejecting negative or non-numeric input
    pub fn set_zeros_from_input(input: &str) -> Result<Self, LinkError> {
        parse_count("zeros", input).map(Command::SetZeros)
    }

    /// Build `SetEntropy` from user text, rejecting negative or non-numeric input
    pub fn set_entropy_from_input(input: &str) -> Result<Self, LinkError> {
        parse_count("entropy", input).map(Command::SetEntropy)
    }

    /// Parse console syntax (`zeros 4`, `hash sha256`, `mine stop`, ...).
    ///
    /// Keywords are case-insensitive. Text that is not a known command is
    /// passed through as `Raw` so firmware extensions remain reachable.
    pub fn parse(input: &str) -> Result<Self, LinkError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LinkError::validation("command", "empty input"));
        }

        let mut parts = input.split_whitespace();
        let keyword = parts.next().unwrap_or_default().to_ascii_lowercase();
        let arg = parts.next();
        let extra = parts.next();

        let command = match (keyword.as_str(), arg, extra) {
            ("help", None, _) => Command::Help,
            ("info", None, _) => Command::Info,
            ("reset", None, _) => Command::Reset,
            ("mine", None, _) => Command::Mine,
            ("mine", Some(a), None) if a.eq_ignore_ascii_case("stop") => Command::MineStop,
            ("mine_stop" | "stop", None, _) => Command::MineStop,
            ("zeros", Some(a), None) => Command::set_zeros_from_input(a)?,
            ("entropy", Some(a), None) => Command::set_entropy_from_input(a)?,
            ("zeros" | "entropy", _, _) => {
                let field = if keyword == "zeros" { "zeros" } else { "entropy" };
                return Err(LinkError::validation(field, "expected exactly one number"));
            }
            ("hash", None, _) => Command::HashInfo,
            ("hash", Some(a), None) => match HashAlgorithm::from_name(a) {
                Some(alg) => Command::Hash(alg),
                None => {
                    return Err(LinkError::validation(
                        "hash",
                        format!("unknown algorithm '{}' (expected sha256 or keccak256)", a),
                    ))
                }
            },
            _ => Command::Raw(input.to_string()),
        };
        Ok(command)
    }

    /// Encode to the exact line written to the device, terminator included.
    ///
    /// `MineStop` encodes to `None`: it is never transmitted.
    pub fn encode(&self) -> Result<Option<String>, LinkError> {
        let line = match self {
            Command::Help => "help".to_string(),
            Command::Info => "info".to_string(),
            Command::Reset => "reset".to_string(),
            Command::Mine => "mine".to_string(),
            Command::MineStop => return Ok(None),
            Command::SetZeros(n) => format!("zeros {}", n),
            Command::SetEntropy(n) => format!("entropy {}", n),
            Command::Hash(alg) => format!("hash {}", alg.keyword()),
            Command::HashInfo => "hash".to_string(),
            Command::Raw(text) => {
                if text.trim().is_empty() {
                    return Err(LinkError::validation("raw", "empty command"));
                }
                if text.contains(['\r', '\n']) {
                    return Err(LinkError::validation("raw", "must be a single line"));
                }
                text.clone()
            }
        };
        Ok(Some(line + TERMINATOR))
    }
}

fn parse_count(field: &'static str, input: &str) -> Result<u32, LinkError> {
    let input = input.trim();
    if input.starts_with('-') {
        return Err(LinkError::validation(field, format!("'{}' is negative", input)));
    }
    input
        .parse::<u32>()
        .map_err(|_| LinkError::validation(field, format!("'{}' is not a non-negative integer", input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(cmd: Command) -> String {
        cmd.encode().unwrap().unwrap()
    }

    #[test]
    fn test_encode_keywords() {
        assert_eq!(line(Command::Help), "help\n");
        assert_eq!(line(Command::Info), "info\n");
        assert_eq!(line(Command::Reset), "reset\n");
        assert_eq!(line(Command::Mine), "mine\n");
        assert_eq!(line(Command::SetZeros(7)), "zeros 7\n");
        assert_eq!(line(Command::SetEntropy(0)), "entropy 0\n");
        assert_eq!(line(Command::Hash(HashAlgorithm::Sha256)), "hash sha256\n");
        assert_eq!(line(Command::Hash(HashAlgorithm::Keccak256)), "hash keccak256\n");
        assert_eq!(line(Command::HashInfo), "hash\n");
        assert_eq!(line(Command::Raw("echo hi".into())), "echo hi\n");
    }

    #[test]
    fn test_mine_stop_is_never_encoded() {
        assert_eq!(Command::MineStop.encode().unwrap(), None);
    }

    #[test]
    fn test_raw_must_be_one_line() {
        assert!(matches!(
            Command::Raw("a\nb".into()).encode(),
            Err(LinkError::Validation { field: "raw", .. })
        ));
        assert!(Command::Raw("  ".into()).encode().is_err());
    }

    #[test]
    fn test_numeric_input_validation() {
        assert_eq!(Command::set_zeros_from_input(" 4 ").unwrap(), Command::SetZeros(4));
        assert!(matches!(
            Command::set_entropy_from_input("-1"),
            Err(LinkError::Validation { field: "entropy", .. })
        ));
        assert!(matches!(
            Command::set_entropy_from_input("abc"),
            Err(LinkError::Validation { field: "entropy", .. })
        ));
        assert!(Command::set_zeros_from_input("").is_err());
        assert!(Command::set_zeros_from_input("4.5").is_err());
    }

    #[test]
    fn test_parse_console_syntax() {
        assert_eq!(Command::parse("HELP").unwrap(), Command::Help);
        assert_eq!(Command::parse("mine").unwrap(), Command::Mine);
        assert_eq!(Command::parse("mine stop").unwrap(), Command::MineStop);
        assert_eq!(Command::parse("mine_stop").unwrap(), Command::MineStop);
        assert_eq!(Command::parse("stop").unwrap(), Command::MineStop);
        assert_eq!(Command::parse("zeros 3").unwrap(), Command::SetZeros(3));
        assert_eq!(Command::parse("Entropy 200").unwrap(), Command::SetEntropy(200));
        assert_eq!(Command::parse("hash").unwrap(), Command::HashInfo);
        assert_eq!(
            Command::parse("hash Keccak").unwrap(),
            Command::Hash(HashAlgorithm::Keccak256)
        );
        assert_eq!(
            Command::parse("status now").unwrap(),
            Command::Raw("status now".into())
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(Command::parse("").is_err());
        assert!(matches!(
            Command::parse("entropy -5"),
            Err(LinkError::Validation { field: "entropy", .. })
        ));
        assert!(matches!(
            Command::parse("zeros"),
            Err(LinkError::Validation { field: "zeros", .. })
        ));
        assert!(Command::parse("zeros 1 2").is_err());
        assert!(matches!(
            Command::parse("hash md5"),
            Err(LinkError::Validation { field: "hash", .. })
        ));
    }
}
