//! Thin client-library mirror of the wire protocol, for tests and the
//! interactive terminal client. One `Battleship` wraps one connection and
//! tracks just enough state to drive a game to completion.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::commitment::{self, Orientation, ShipPlacement};
use crate::sexpr::{self, Expr};

#[derive(Debug)]
pub enum ClientError {
    Io(io::Error),
    Protocol(String),
    Disconnected,
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "io error: {e}"),
            ClientError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ClientError::Disconnected => write!(f, "server closed the connection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// We were asked to shoot; nothing fired yet.
    AwaitingOurShot,
    /// We just fired and are waiting for the opponent's hit/miss.
    ShotPending { x: u8, y: u8 },
    WeWereHit { x: u8, y: u8, hit: bool },
    TheyWereHit { hit: bool },
    GameEnded { we_won: bool },
}

pub struct Battleship {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    nick: String,
    client_salt: String,
    server_salt: String,
    layout: Option<[ShipPlacement; 5]>,
    game_id: Option<u64>,
    finished: bool,
    won: Option<bool>,
    draw: bool,
    aborted: bool,
}

impl Battleship {
    pub async fn connect(path: &str, nick: &str) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path).await?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half).lines();

        let client_salt = commitment::generate_salt();
        write_line(&mut writer, &format!(r#"(nick "{nick}" "{client_salt}")"#)).await?;
        let reply = read_expr(&mut reader).await?;
        let server_salt = match reply.as_compound() {
            Some([tag, Expr::String(salt)]) if tag.as_identifier() == Some("ok") => salt.clone(),
            Some([tag, Expr::String(reason)]) if tag.as_identifier() == Some("error") => {
                return Err(ClientError::Protocol(reason.clone()));
            }
            _ => return Err(ClientError::Protocol("unexpected reply to nick".into())),
        };

        Ok(Battleship {
            reader,
            writer,
            nick: nick.to_string(),
            client_salt,
            server_salt,
            layout: None,
            game_id: None,
            finished: false,
            won: None,
            draw: false,
            aborted: false,
        })
    }

    pub fn put_ships(&mut self, ships: [ShipPlacement; 5]) {
        self.layout = Some(ships);
    }

    fn commitment_hash(&self) -> Result<String, ClientError> {
        let layout = self.layout.ok_or_else(|| ClientError::Protocol("layout not set".into()))?;
        let canonical = commitment::canonical_layout(&layout);
        Ok(commitment::commitment_hash(&self.server_salt, &self.client_salt, &canonical))
    }

    pub async fn start(&mut self) -> Result<u64, ClientError> {
        let hash = self.commitment_hash()?;
        write_line(&mut self.writer, &format!(r#"(start "{hash}")"#)).await?;
        let reply = read_expr(&mut self.reader).await?;
        let game_id = expect_started(&reply)?;
        self.game_id = Some(game_id);
        Ok(game_id)
    }

    pub async fn auto(&mut self) -> Result<u64, ClientError> {
        let hash = self.commitment_hash()?;
        write_line(&mut self.writer, &format!(r#"(auto "{hash}")"#)).await?;
        let reply = read_expr(&mut self.reader).await?;
        let game_id = match reply.as_compound() {
            Some([tag, n]) if tag.as_identifier() == Some("started") => {
                n.as_integer().ok_or_else(|| ClientError::Protocol("bad game id".into()))? as u64
            }
            Some([tag, n, joined]) if tag.as_identifier() == Some("game") && joined.as_identifier() == Some("joined") => {
                n.as_integer().ok_or_else(|| ClientError::Protocol("bad game id".into()))? as u64
            }
            Some([tag, reason]) if tag.as_identifier() == Some("error") => {
                return Err(ClientError::Protocol(reason.as_str().unwrap_or("").to_string()));
            }
            _ => return Err(ClientError::Protocol("unexpected reply to auto".into())),
        };
        self.game_id = Some(game_id);
        Ok(game_id)
    }

    pub async fn join(&mut self, game_id: u64) -> Result<(), ClientError> {
        let hash = self.commitment_hash()?;
        write_line(&mut self.writer, &format!(r#"(join {game_id} "{hash}")"#)).await?;
        let reply = read_expr(&mut self.reader).await?;
        expect_game_joined(&reply, game_id)?;
        self.game_id = Some(game_id);
        Ok(())
    }

    pub async fn list_games(&mut self) -> Result<Vec<Expr>, ClientError> {
        write_line(&mut self.writer, "(list)").await?;
        let reply = read_expr(&mut self.reader).await?;
        match reply {
            Expr::Compound(items) if items.first().and_then(Expr::as_identifier) == Some("games") => {
                Ok(items.into_iter().skip(1).collect())
            }
            _ => Err(ClientError::Protocol("unexpected reply to list".into())),
        }
    }

    pub async fn shoot(&mut self, x: u8, y: u8) -> Result<(), ClientError> {
        let game_id = self.game_id.ok_or_else(|| ClientError::Protocol("not in a game".into()))?;
        write_line(&mut self.writer, &format!("(shoot {game_id} {x} {y})")).await?;
        Ok(())
    }

    pub async fn reply_hit(&mut self, hit: bool) -> Result<(), ClientError> {
        let game_id = self.game_id.ok_or_else(|| ClientError::Protocol("not in a game".into()))?;
        let tag = if hit { "hit" } else { "miss" };
        write_line(&mut self.writer, &format!("({tag} {game_id})")).await?;
        Ok(())
    }

    pub async fn submit_layout(&mut self) -> Result<(), ClientError> {
        let game_id = self.game_id.ok_or_else(|| ClientError::Protocol("not in a game".into()))?;
        let layout = self.layout.ok_or_else(|| ClientError::Protocol("layout not set".into()))?;
        let ships = layout
            .iter()
            .map(|s| format!("(ship {} {} {} {})", s.size, s.x, s.y, s.orientation.as_identifier()))
            .collect::<Vec<_>>()
            .join(" ");
        write_line(&mut self.writer, &format!("(layout {game_id} {ships})")).await?;
        Ok(())
    }

    /// Reads the next server line and returns it unparsed, for the
    /// interactive terminal client's event loop.
    pub async fn next_line(&mut self) -> Result<Option<Expr>, ClientError> {
        match self.reader.next_line().await? {
            Some(line) => Ok(Some(sexpr::parse(&line).map_err(|_| ClientError::Protocol("bad line from server".into()))?)),
            None => Ok(None),
        }
    }

    pub fn record_end(&mut self, winner_nick: &str) {
        self.finished = true;
        if self.won == Some(!winner_eq(winner_nick, &self.nick)) {
            self.draw = true;
        } else if self.won.is_some() {
            self.draw = true;
        }
        self.won = Some(winner_eq(winner_nick, &self.nick));
    }

    pub fn record_aborted(&mut self) {
        self.aborted = true;
        self.finished = true;
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn won(&self) -> bool {
        self.won.unwrap_or(false) && !self.draw
    }

    pub fn lost(&self) -> bool {
        self.finished && !self.won.unwrap_or(true) && !self.draw
    }

    pub fn draw(&self) -> bool {
        self.draw
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }
}

fn winner_eq(winner_nick: &str, mine: &str) -> bool {
    winner_nick == mine
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

async fn read_expr(reader: &mut Lines<BufReader<OwnedReadHalf>>) -> Result<Expr, ClientError> {
    let line = reader.next_line().await?.ok_or(ClientError::Disconnected)?;
    sexpr::parse(&line).map_err(|_| ClientError::Protocol(format!("unparsable line: {line}")))
}

fn expect_started(expr: &Expr) -> Result<u64, ClientError> {
    match expr.as_compound() {
        Some([tag, n]) if tag.as_identifier() == Some("started") => {
            Ok(n.as_integer().ok_or_else(|| ClientError::Protocol("bad game id".into()))? as u64)
        }
        Some([tag, reason]) if tag.as_identifier() == Some("error") => {
            Err(ClientError::Protocol(reason.as_str().unwrap_or("").to_string()))
        }
        _ => Err(ClientError::Protocol("unexpected reply to start".into())),
    }
}

fn expect_game_joined(expr: &Expr, expected_id: u64) -> Result<(), ClientError> {
    match expr.as_compound() {
        Some([tag, n, joined])
            if tag.as_identifier() == Some("game") && joined.as_identifier() == Some("joined") =>
        {
            let id = n.as_integer().ok_or_else(|| ClientError::Protocol("bad game id".into()))? as u64;
            if id != expected_id {
                return Err(ClientError::Protocol("game id mismatch".into()));
            }
            Ok(())
        }
        Some([tag, reason]) if tag.as_identifier() == Some("error") => {
            Err(ClientError::Protocol(reason.as_str().unwrap_or("").to_string()))
        }
        _ => Err(ClientError::Protocol("unexpected reply to join".into())),
    }
}

/// Five non-overlapping ships in the standard {5,4,3,3,2} fleet, laid out
/// along the top rows — used by the terminal client's "quick start" flow.
pub fn default_fleet() -> [ShipPlacement; 5] {
    [
        ShipPlacement { size: 5, x: 0, y: 0, orientation: Orientation::Horizontal },
        ShipPlacement { size: 4, x: 0, y: 1, orientation: Orientation::Horizontal },
        ShipPlacement { size: 3, x: 0, y: 2, orientation: Orientation::Horizontal },
        ShipPlacement { size: 3, x: 0, y: 3, orientation: Orientation::Horizontal },
        ShipPlacement { size: 2, x: 0, y: 4, orientation: Orientation::Horizontal },
    ]
}
