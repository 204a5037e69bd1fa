//! Typed wire messages, converted to and from [`Expr`] trees.
//!
//! Inbound commands parse into [`Request`]; outbound replies are built with
//! the small helper functions below rather than a mirrored enum, since every
//! reply is either a fixed shape or a thin wrapper around already-owned data
//! (see `examples/other_examples/.../miroslavkrysl-bssrv` for the
//! enum-with-`Display` shape this is adapted from).

use crate::commitment::{Orientation, ShipPlacement};
use crate::error::ProtocolError;
use crate::sexpr::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Nick { nick: String, client_salt: String },
    Start { hash: String },
    Auto { hash: String },
    Join { game_id: u64, hash: String },
    JoinPlayer { nick: String, hash: String },
    List,
    Shoot { game_id: u64, x: u8, y: u8 },
    Hit { game_id: u64 },
    Miss { game_id: u64 },
    Layout { game_id: u64, ships: [ShipPlacement; 5] },
}

fn type_mismatch(cmd: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::TypeMismatch { cmd, reason: reason.into() }
}

fn wrong_arity(cmd: &'static str, expected: usize, got: usize) -> ProtocolError {
    ProtocolError::WrongArity { cmd, expected, got }
}

fn arg_str<'a>(cmd: &'static str, args: &'a [Expr], i: usize, what: &str) -> Result<&'a str, ProtocolError> {
    args[i].as_str().ok_or_else(|| type_mismatch(cmd, format!("{what} must be a string")))
}

fn arg_u64(cmd: &'static str, args: &[Expr], i: usize, what: &str) -> Result<u64, ProtocolError> {
    let n = args[i].as_integer().ok_or_else(|| type_mismatch(cmd, format!("{what} must be an integer")))?;
    u64::try_from(n).map_err(|_| type_mismatch(cmd, format!("{what} must be non-negative")))
}

fn arg_u8(cmd: &'static str, args: &[Expr], i: usize, what: &str) -> Result<u8, ProtocolError> {
    let n = args[i].as_integer().ok_or_else(|| type_mismatch(cmd, format!("{what} must be an integer")))?;
    u8::try_from(n).map_err(|_| type_mismatch(cmd, format!("{what} out of range")))
}

fn parse_ship(expr: &Expr) -> Result<ShipPlacement, ProtocolError> {
    const CMD: &str = "layout";
    let items = expr.as_compound().ok_or_else(|| type_mismatch(CMD, "each ship must be a compound"))?;
    if items.len() != 5 {
        return Err(wrong_arity("ship", 5, items.len()));
    }
    if items[0].as_identifier() != Some("ship") {
        return Err(type_mismatch(CMD, "expected a (ship ...) entry"));
    }
    let size = arg_u8(CMD, items, 1, "ship size")?;
    let x = arg_u8(CMD, items, 2, "ship x")?;
    let y = arg_u8(CMD, items, 3, "ship y")?;
    let orientation = match items[4].as_identifier() {
        Some("vertical") => Orientation::Vertical,
        Some("horizontal") => Orientation::Horizontal,
        Some(_) => return Err(type_mismatch(CMD, "orientation must be vertical or horizontal")),
        None => return Err(type_mismatch(CMD, "orientation must be an identifier")),
    };
    Ok(ShipPlacement { size, x, y, orientation })
}

/// Parses the body of a `(layout ...)` command into its five ship entries.
/// `items` is the slice following the game id, i.e. `&args[2..]`.
fn parse_ships(items: &[Expr]) -> Result<[ShipPlacement; 5], ProtocolError> {
    if items.len() != 5 {
        return Err(wrong_arity("layout", 7, items.len() + 2));
    }
    let mut out = Vec::with_capacity(5);
    for item in items {
        out.push(parse_ship(item)?);
    }
    out.try_into().map_err(|_| type_mismatch("layout", "expected exactly 5 ships"))
}

/// Parses a dispatched command (the identifier tag plus its arguments have
/// already been split out of the enclosing top-level compound).
pub fn parse_request(tag: &str, args: &[Expr]) -> Result<Request, ProtocolError> {
    match tag {
        "nick" => {
            if args.len() != 3 {
                return Err(wrong_arity("nick", 3, args.len()));
            }
            Ok(Request::Nick {
                nick: arg_str("nick", args, 1, "nickname")?.to_string(),
                client_salt: arg_str("nick", args, 2, "client salt")?.to_string(),
            })
        }
        "start" => {
            if args.len() != 2 {
                return Err(wrong_arity("start", 2, args.len()));
            }
            Ok(Request::Start { hash: arg_str("start", args, 1, "hash")?.to_string() })
        }
        "auto" => {
            if args.len() != 2 {
                return Err(wrong_arity("auto", 2, args.len()));
            }
            Ok(Request::Auto { hash: arg_str("auto", args, 1, "hash")?.to_string() })
        }
        "join" => {
            if args.len() != 3 {
                return Err(wrong_arity("join", 3, args.len()));
            }
            Ok(Request::Join {
                game_id: arg_u64("join", args, 1, "game id")?,
                hash: arg_str("join", args, 2, "hash")?.to_string(),
            })
        }
        "joinplayer" => {
            if args.len() != 3 {
                return Err(wrong_arity("joinplayer", 3, args.len()));
            }
            Ok(Request::JoinPlayer {
                nick: arg_str("joinplayer", args, 1, "nickname")?.to_string(),
                hash: arg_str("joinplayer", args, 2, "hash")?.to_string(),
            })
        }
        "list" => {
            if args.len() != 1 {
                return Err(wrong_arity("list", 1, args.len()));
            }
            Ok(Request::List)
        }
        "shoot" => {
            if args.len() != 4 {
                return Err(wrong_arity("shoot", 4, args.len()));
            }
            let game_id = arg_u64("shoot", args, 1, "game id")?;
            let x = arg_u8("shoot", args, 2, "x")?;
            let y = arg_u8("shoot", args, 3, "y")?;
            if x >= 10 || y >= 10 {
                return Err(ProtocolError::CoordinateOutOfRange);
            }
            Ok(Request::Shoot { game_id, x, y })
        }
        "hit" => {
            if args.len() != 2 {
                return Err(wrong_arity("hit", 2, args.len()));
            }
            Ok(Request::Hit { game_id: arg_u64("hit", args, 1, "game id")? })
        }
        "miss" => {
            if args.len() != 2 {
                return Err(wrong_arity("miss", 2, args.len()));
            }
            Ok(Request::Miss { game_id: arg_u64("miss", args, 1, "game id")? })
        }
        "layout" => {
            if args.len() < 2 {
                return Err(wrong_arity("layout", 7, args.len()));
            }
            Ok(Request::Layout {
                game_id: arg_u64("layout", args, 1, "game id")?,
                ships: parse_ships(&args[2..])?,
            })
        }
        other => Err(ProtocolError::UnknownCommand(other.to_string())),
    }
}

// ── Reply builders ───────────────────────────────────────────────────────

fn tagged(tag: &str, rest: Vec<Expr>) -> Expr {
    let mut items = vec![Expr::identifier(tag)];
    items.extend(rest);
    Expr::compound(items)
}

pub fn ok(server_salt: &str) -> Expr {
    tagged("ok", vec![Expr::string(server_salt)])
}

pub fn started(game_id: u64) -> Expr {
    tagged("started", vec![Expr::Integer(game_id as i64)])
}

pub fn game_joined(game_id: u64) -> Expr {
    tagged("game", vec![Expr::Integer(game_id as i64), Expr::identifier("joined")])
}

pub fn error(err: &ProtocolError) -> Expr {
    tagged("error", vec![Expr::string(err.to_string())])
}

pub fn shoot(game_id: u64, x: u8, y: u8) -> Expr {
    tagged("shoot", vec![Expr::Integer(game_id as i64), Expr::Integer(x as i64), Expr::Integer(y as i64)])
}

pub fn hit(game_id: u64) -> Expr {
    tagged("hit", vec![Expr::Integer(game_id as i64)])
}

pub fn miss(game_id: u64) -> Expr {
    tagged("miss", vec![Expr::Integer(game_id as i64)])
}

pub fn end(game_id: u64, winner_nick: &str) -> Expr {
    tagged("end", vec![Expr::Integer(game_id as i64), Expr::string(winner_nick)])
}

pub fn game_ok() -> Expr {
    tagged("game", vec![Expr::identifier("ok")])
}

pub fn game_aborted() -> Expr {
    tagged("game", vec![Expr::identifier("aborted")])
}

pub fn hash_mismatch(nick: &str) -> Expr {
    tagged("hash-mismatch", vec![Expr::string(nick)])
}

pub fn board_mismatch(nick: &str) -> Expr {
    tagged("board-mismatch", vec![Expr::string(nick)])
}

/// One entry inside a `(games ...)` reply.
pub fn waiting_entry(host_nick: &str, game_id: u64) -> Expr {
    tagged("waiting", vec![Expr::string(host_nick), Expr::Integer(game_id as i64)])
}

pub fn active_entry(host_nick: &str, joiner_nick: &str, game_id: u64) -> Expr {
    tagged(
        "active",
        vec![Expr::string(host_nick), Expr::string(joiner_nick), Expr::Integer(game_id as i64)],
    )
}

pub fn games(entries: Vec<Expr>) -> Expr {
    tagged("games", entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr;

    #[test]
    fn parses_nick_request() {
        let expr = sexpr::parse(r#"(nick "bob" "csalt")"#).unwrap();
        let compound = expr.as_compound().unwrap();
        let tag = compound[0].as_identifier().unwrap();
        let req = parse_request(tag, compound).unwrap();
        assert_eq!(req, Request::Nick { nick: "bob".into(), client_salt: "csalt".into() });
    }

    #[test]
    fn parses_layout_request() {
        let expr = sexpr::parse(
            "(layout 1 (ship 5 0 0 horizontal) (ship 4 0 1 horizontal) (ship 3 0 2 horizontal) \
             (ship 3 0 3 horizontal) (ship 2 0 4 horizontal))",
        )
        .unwrap();
        let compound = expr.as_compound().unwrap();
        let tag = compound[0].as_identifier().unwrap();
        let req = parse_request(tag, compound).unwrap();
        match req {
            Request::Layout { game_id, ships } => {
                assert_eq!(game_id, 1);
                assert_eq!(ships[0].size, 5);
                assert_eq!(ships[4].orientation, Orientation::Horizontal);
            }
            _ => panic!("expected Layout"),
        }
    }

    #[test]
    fn rejects_wrong_arity() {
        let expr = sexpr::parse("(shoot 1 2)").unwrap();
        let compound = expr.as_compound().unwrap();
        assert!(parse_request("shoot", compound).is_err());
    }
}
