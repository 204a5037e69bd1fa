//! Player directory, game directory, and the blocking `list` wakeup.
//!
//! Everything here lives behind a single `Rc<RefCell<Directory>>` owned by
//! the accept loop and cloned into every session task — single-threaded,
//! cooperative scheduling means no lock is needed, only a borrow check.

use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::{Notify, mpsc};

use crate::commitment::ShipPlacement;
use crate::error::ProtocolError;
use crate::protocol::{self};
use crate::sexpr::Expr;

pub type SessionId = u64;
pub type GameId = u64;
pub type Outbox = mpsc::UnboundedSender<Expr>;

/// 10x10 grid recording, for one player's own board, which cells the
/// opponent has fired at and whether they landed. This is *not* the
/// opponent's board — it only ever records shots aimed at its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Unknown,
    Hit,
    Miss,
}

#[derive(Debug, Clone)]
pub struct Board {
    cells: [[Cell; 10]; 10],
}

impl Board {
    fn new() -> Self {
        Board { cells: [[Cell::Unknown; 10]; 10] }
    }

    pub fn mark(&mut self, x: u8, y: u8, hit: bool) {
        self.cells[y as usize][x as usize] = if hit { Cell::Hit } else { Cell::Miss };
    }

    pub fn get(&self, x: u8, y: u8) -> Cell {
        self.cells[y as usize][x as usize]
    }

    /// Number of hit cells. Kept as a derived count rather than a separately
    /// tracked counter, so the "hit count equals hit cells on the board
    /// view" invariant holds by construction.
    pub fn hit_count(&self) -> u32 {
        self.cells.iter().flatten().filter(|c| matches!(c, Cell::Hit)).count() as u32
    }
}

pub struct PlayerEntry {
    pub nick: String,
    pub client_salt: String,
    pub server_salt: String,
    pub outbox: Outbox,
    pub game_id: Option<GameId>,
}

pub struct GameSlot {
    pub session: SessionId,
    pub committed_hash: String,
    pub declared_layout: Option<[ShipPlacement; 5]>,
    pub board_view: Board,
    /// A shot fired at this occupant, awaiting this occupant's `(hit …)` /
    /// `(miss …)` reply. Lives on the *target*'s slot, not the shooter's —
    /// the source this was distilled from kept the equivalent field on the
    /// wrong side, which made the turn bookkeeping read backwards.
    pub pending_shot: Option<(u8, u8)>,
}

impl GameSlot {
    fn new(session: SessionId, committed_hash: String) -> Self {
        GameSlot {
            session,
            committed_hash,
            declared_layout: None,
            board_view: Board::new(),
            pending_shot: None,
        }
    }
}

pub struct Game {
    pub id: GameId,
    pub host: GameSlot,
    pub joiner: Option<GameSlot>,
    /// Set once either side's board view reaches 17 hits; gates `layout`
    /// acceptance and lets a second, near-simultaneous exchange still land
    /// its own independent `(end ...)` for a mutual finish.
    pub ended: bool,
}

impl Game {
    pub fn is_waiting(&self) -> bool {
        self.joiner.is_none()
    }

    pub fn other_slot_mut(&mut self, session: SessionId) -> Option<&mut GameSlot> {
        if self.host.session == session {
            self.joiner.as_mut()
        } else if self.joiner.as_ref().is_some_and(|j| j.session == session) {
            Some(&mut self.host)
        } else {
            None
        }
    }

    pub fn own_slot_mut(&mut self, session: SessionId) -> Option<&mut GameSlot> {
        if self.host.session == session {
            Some(&mut self.host)
        } else if self.joiner.as_mut().is_some_and(|j| j.session == session) {
            self.joiner.as_mut()
        } else {
            None
        }
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.host.session == session || self.joiner.as_ref().is_some_and(|j| j.session == session)
    }
}

#[derive(Default)]
pub struct Directory {
    players: HashMap<SessionId, PlayerEntry>,
    nick_index: HashMap<String, SessionId>,
    games: HashMap<GameId, Game>,
    next_session_id: SessionId,
    next_game_id: GameId,
    list_notify: Rc<Notify>,
}

impl Directory {
    pub fn new() -> Self {
        Directory { next_game_id: 1, ..Default::default() }
    }

    pub fn allocate_session_id(&mut self) -> SessionId {
        self.next_session_id += 1;
        self.next_session_id
    }

    pub fn nick_taken(&self, nick: &str) -> bool {
        self.nick_index.contains_key(nick)
    }

    pub fn register_player(
        &mut self,
        session: SessionId,
        nick: String,
        client_salt: String,
        server_salt: String,
        outbox: Outbox,
    ) {
        self.nick_index.insert(nick.clone(), session);
        self.players.insert(
            session,
            PlayerEntry { nick, client_salt, server_salt, outbox, game_id: None },
        );
    }

    pub fn player(&self, session: SessionId) -> Option<&PlayerEntry> {
        self.players.get(&session)
    }

    pub fn session_for_nick(&self, nick: &str) -> Option<SessionId> {
        self.nick_index.get(nick).copied()
    }

    pub fn send_to(&self, session: SessionId, msg: Expr) {
        if let Some(player) = self.players.get(&session) {
            let _ = player.outbox.send(msg);
        }
    }

    pub fn player_game(&self, session: SessionId) -> Option<GameId> {
        self.players.get(&session).and_then(|p| p.game_id)
    }

    pub fn game(&self, id: GameId) -> Option<&Game> {
        self.games.get(&id)
    }

    pub fn game_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.get_mut(&id)
    }

    pub fn create_game(&mut self, host: SessionId, hash: String) -> GameId {
        let id = self.next_game_id;
        self.next_game_id += 1;
        self.games.insert(id, Game { id, host: GameSlot::new(host, hash), joiner: None, ended: false });
        if let Some(p) = self.players.get_mut(&host) {
            p.game_id = Some(id);
        }
        self.list_notify.notify_waiters();
        id
    }

    pub fn find_any_waiting_game(&self) -> Option<GameId> {
        self.games.values().find(|g| g.is_waiting()).map(|g| g.id)
    }

    pub fn join_game(&mut self, id: GameId, joiner: SessionId, hash: String) -> Result<SessionId, ProtocolError> {
        let host = {
            let game = self.games.get_mut(&id).ok_or(ProtocolError::UnknownGame(id))?;
            if !game.is_waiting() {
                return Err(ProtocolError::GameFull(id));
            }
            if game.host.session == joiner {
                return Err(ProtocolError::SelfJoin);
            }
            game.joiner = Some(GameSlot::new(joiner, hash));
            game.host.session
        };
        if let Some(p) = self.players.get_mut(&joiner) {
            p.game_id = Some(id);
        }
        self.list_notify.notify_waiters();
        Ok(host)
    }

    pub fn remove_game(&mut self, id: GameId) {
        if let Some(game) = self.games.remove(&id) {
            if let Some(p) = self.players.get_mut(&game.host.session) {
                p.game_id = None;
            }
            if let Some(joiner) = &game.joiner {
                if let Some(p) = self.players.get_mut(&joiner.session) {
                    p.game_id = None;
                }
            }
        }
        self.list_notify.notify_waiters();
    }

    /// Removes a player on disconnect: drops their waiting game (if they
    /// were hosting one with nobody joined yet) but leaves active games
    /// intact — the peer is simply left without further traffic, matching
    /// the documented abandonment behaviour.
    pub fn remove_player(&mut self, session: SessionId) {
        if let Some(entry) = self.players.remove(&session) {
            self.nick_index.remove(&entry.nick);
            if let Some(game_id) = entry.game_id {
                let should_remove = self.games.get(&game_id).is_some_and(Game::is_waiting);
                if should_remove {
                    self.games.remove(&game_id);
                    self.list_notify.notify_waiters();
                }
            }
        }
    }

    pub fn games_summary(&self) -> Vec<Expr> {
        self.games
            .values()
            .map(|g| {
                let host_nick = self.players.get(&g.host.session).map(|p| p.nick.as_str()).unwrap_or("");
                match &g.joiner {
                    None => protocol::waiting_entry(host_nick, g.id),
                    Some(joiner) => {
                        let joiner_nick =
                            self.players.get(&joiner.session).map(|p| p.nick.as_str()).unwrap_or("");
                        protocol::active_entry(host_nick, joiner_nick, g.id)
                    }
                }
            })
            .collect()
    }

    pub fn has_waiting_game(&self) -> bool {
        self.games.values().any(Game::is_waiting)
    }

    fn list_notify_handle(&self) -> Rc<Notify> {
        self.list_notify.clone()
    }
}

/// Awaits at least one *waiting* game existing, then returns a snapshot of
/// every tracked game (waiting and active alike). Once every outstanding
/// game has been joined, a caller blocks here forever until a new one is
/// started — matching a waiting, not merely non-empty, games set.
/// Race-free: `Notify::notified()` is created before the predicate check,
/// so a notification fired in between is never missed.
pub async fn wait_for_games(dir: &Rc<std::cell::RefCell<Directory>>) -> Vec<Expr> {
    loop {
        let notify = dir.borrow().list_notify_handle();
        let notified = notify.notified();
        if dir.borrow().has_waiting_game() {
            return dir.borrow().games_summary();
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_outbox() -> (Outbox, mpsc::UnboundedReceiver<Expr>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn game_ids_are_monotonic_and_not_reused() {
        let mut dir = Directory::new();
        let (tx, _rx) = make_outbox();
        dir.register_player(1, "a".into(), "ca".into(), "sa".into(), tx);
        let g1 = dir.create_game(1, "hash".into());
        dir.remove_game(g1);
        let (tx2, _rx2) = make_outbox();
        dir.register_player(2, "b".into(), "cb".into(), "sb".into(), tx2);
        let g2 = dir.create_game(2, "hash2".into());
        assert!(g2 > g1);
    }

    #[test]
    fn nick_uniqueness_is_enforced_by_the_index() {
        let mut dir = Directory::new();
        let (tx, _rx) = make_outbox();
        dir.register_player(1, "bob".into(), "c".into(), "s".into(), tx);
        assert!(dir.nick_taken("bob"));
        assert!(!dir.nick_taken("alice"));
    }

    #[test]
    fn waiting_game_is_removed_on_host_disconnect() {
        let mut dir = Directory::new();
        let (tx, _rx) = make_outbox();
        dir.register_player(1, "bob".into(), "c".into(), "s".into(), tx);
        let game_id = dir.create_game(1, "hash".into());
        dir.remove_player(1);
        assert!(dir.game(game_id).is_none());
    }

    #[test]
    fn active_game_survives_disconnect() {
        let mut dir = Directory::new();
        let (tx1, _rx1) = make_outbox();
        let (tx2, _rx2) = make_outbox();
        dir.register_player(1, "bob".into(), "c1".into(), "s1".into(), tx1);
        dir.register_player(2, "amy".into(), "c2".into(), "s2".into(), tx2);
        let game_id = dir.create_game(1, "hash1".into());
        dir.join_game(game_id, 2, "hash2".into()).unwrap();
        dir.remove_player(1);
        assert!(dir.game(game_id).is_some());
    }
}
