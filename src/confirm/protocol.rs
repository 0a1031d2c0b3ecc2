//! Local line protocol between presenters and the daemon
//!
//! One message per line, `COMMAND:HASH`, answered with `ACK` or `ERR <reason>`.
//! `ACTION:<name>:<hash>` executes the named candidate of a multiple-choice
//! confirmation.

use lazy_regex::regex_is_match;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const ACK: &str = "ACK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Shown(String),
    Execute(String),
    Skip(String),
    Action { name: String, hash: String },
}

impl Message {
    pub fn hash(&self) -> &str {
        match self {
            Message::Shown(hash) | Message::Execute(hash) | Message::Skip(hash) => hash,
            Message::Action { hash, .. } => hash,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("malformed message '{0}'")]
    Malformed(String),

    #[error("invalid hash '{0}'")]
    InvalidHash(String),
}

fn valid_hash(hash: &str) -> bool {
    regex_is_match!(r"^[0-9a-f]{16}$", hash)
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let (command, rest) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;

        let message = match command.to_ascii_uppercase().as_str() {
            "SHOWN" => Message::Shown(rest.to_string()),
            "EXECUTE" => Message::Execute(rest.to_string()),
            "SKIP" => Message::Skip(rest.to_string()),
            "ACTION" => {
                // Action names may contain ':', the hash never does
                let (name, hash) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
                if name.is_empty() {
                    return Err(ProtocolError::Malformed(line.to_string()));
                }
                Message::Action {
                    name: name.to_string(),
                    hash: hash.to_string(),
                }
            }
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };

        if !valid_hash(message.hash()) {
            return Err(ProtocolError::InvalidHash(message.hash().to_string()));
        }
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Shown(hash) => write!(f, "SHOWN:{}", hash),
            Message::Execute(hash) => write!(f, "EXECUTE:{}", hash),
            Message::Skip(hash) => write!(f, "SKIP:{}", hash),
            Message::Action { name, hash } => write!(f, "ACTION:{}:{}", name, hash),
        }
    }
}

pub fn error_reply(reason: &str) -> String {
    format!("ERR {}", reason.replace(['\r', '\n'], " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef";

    #[test]
    fn test_parse_commands() {
        assert_eq!(format!("SHOWN:{}", HASH).parse(), Ok(Message::Shown(HASH.to_string())));
        assert_eq!(format!("execute:{}\n", HASH).parse(), Ok(Message::Execute(HASH.to_string())));
        assert_eq!(format!("SKIP:{}", HASH).parse(), Ok(Message::Skip(HASH.to_string())));
        assert_eq!(
            format!("ACTION:Send: NAS:{}", HASH).parse(),
            Ok(Message::Action {
                name: "Send: NAS".to_string(),
                hash: HASH.to_string()
            })
        );
    }

    #[test]
    fn test_rejects_bad_lines() {
        assert_eq!("".parse::<Message>(), Err(ProtocolError::Empty));
        assert_eq!(
            "HELLO".parse::<Message>(),
            Err(ProtocolError::Malformed("HELLO".to_string()))
        );
        assert_eq!(
            format!("DELETE:{}", HASH).parse::<Message>(),
            Err(ProtocolError::UnknownCommand("DELETE".to_string()))
        );
        assert_eq!(
            "EXECUTE:xyz".parse::<Message>(),
            Err(ProtocolError::InvalidHash("xyz".to_string()))
        );
        assert!(matches!(
            format!("ACTION::{}", HASH).parse::<Message>(),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_display_matches_wire_format() {
        let message = Message::Action {
            name: "Manga".to_string(),
            hash: HASH.to_string(),
        };
        assert_eq!(message.to_string(), format!("ACTION:Manga:{}", HASH));
        assert_eq!(message.to_string().parse::<Message>().unwrap(), message);
    }

    #[test]
    fn test_error_reply_single_line() {
        assert_eq!(error_reply("bad\nthing"), "ERR bad thing");
    }
}
