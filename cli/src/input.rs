//! Line-based terminal commands

use thiserror::Error;

use crate::link;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pull the rope this many times
    Click(u32),
    Ready,
    PlayAgain,
    Join(String),
    Leave,
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Unknown command '{0}' (type 'h' for help)")]
    Unknown(String),

    #[error("Usage: j <peer id or join link>")]
    MissingPeer,
}

pub const HELP: &str = "\
Commands:
  <enter>, c, space   pull (a line of c's or spaces pulls once per character)
  r                   ready
  p                   play again
  j <id|link>         join a peer
  l                   leave the current opponent
  s                   show status
  h                   this help
  q                   quit";

/// Parse one input line.
pub fn parse(line: &str) -> Result<Command, InputError> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.chars().all(|c| c == 'c' || c == ' ') {
        let pulls = u32::try_from(line.len()).unwrap_or(u32::MAX).max(1);
        return Ok(Command::Click(pulls));
    }

    let mut parts = line.trim().splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match verb.to_ascii_lowercase().as_str() {
        "click" => Ok(Command::Click(1)),
        "r" | "ready" => Ok(Command::Ready),
        "p" | "again" | "rematch" => Ok(Command::PlayAgain),
        "j" | "join" => link::parse_target(rest)
            .map(Command::Join)
            .ok_or(InputError::MissingPeer),
        "l" | "leave" => Ok(Command::Leave),
        "s" | "status" => Ok(Command::Status),
        "h" | "help" | "?" => Ok(Command::Help),
        "q" | "quit" | "exit" => Ok(Command::Quit),
        _ => Err(InputError::Unknown(line.trim().to_string())),
    }
}
