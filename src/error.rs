//! Protocol-level errors, surfaced to clients as `(error "<reason>")`.
//!
//! These never close a connection — `src/session.rs` catches every one of
//! these at the command-dispatch boundary and writes the rendered reason
//! back to the offending socket.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line failed to parse as a well-formed S-expression at all.
    Parse,
    /// A command other than `nick` arrived before login completed.
    LoginRequired,
    /// `nick` arrived after the session already logged in.
    AlreadyLoggedIn,
    UnknownCommand(String),
    WrongArity { cmd: &'static str, expected: usize, got: usize },
    TypeMismatch { cmd: &'static str, reason: String },
    NickTaken(String),
    NickNotAlphanumeric,
    AlreadyInGame,
    UnknownGame(u64),
    GameFull(u64),
    SelfJoin,
    UnknownPlayer(String),
    PlayerHasNoWaitingGame(String),
    NotInGame,
    NotYourTurn,
    CoordinateOutOfRange,
    GameNotFinished,
    AlreadySubmittedLayout,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Parse => write!(f, "parse"),
            ProtocolError::LoginRequired => write!(f, "login required"),
            ProtocolError::AlreadyLoggedIn => write!(f, "already logged in"),
            ProtocolError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ProtocolError::WrongArity { cmd, expected, got } => {
                write!(f, "{cmd} expects {expected} argument(s), got {got}")
            }
            ProtocolError::TypeMismatch { cmd, reason } => write!(f, "{cmd}: {reason}"),
            ProtocolError::NickTaken(nick) => write!(f, "nickname already taken: {nick}"),
            ProtocolError::NickNotAlphanumeric => write!(f, "nickname must be non-empty alphanumeric"),
            ProtocolError::AlreadyInGame => write!(f, "already in a game"),
            ProtocolError::UnknownGame(id) => write!(f, "no such game: {id}"),
            ProtocolError::GameFull(id) => write!(f, "game is full: {id}"),
            ProtocolError::SelfJoin => write!(f, "cannot join your own game"),
            ProtocolError::UnknownPlayer(nick) => write!(f, "no such player: {nick}"),
            ProtocolError::PlayerHasNoWaitingGame(nick) => {
                write!(f, "player has no waiting game: {nick}")
            }
            ProtocolError::NotInGame => write!(f, "no such game: not in game"),
            ProtocolError::NotYourTurn => write!(f, "no pending shot"),
            ProtocolError::CoordinateOutOfRange => write!(f, "coordinate out of range"),
            ProtocolError::GameNotFinished => write!(f, "game not finished"),
            ProtocolError::AlreadySubmittedLayout => write!(f, "layout already submitted"),
        }
    }
}

impl std::error::Error for ProtocolError {}
