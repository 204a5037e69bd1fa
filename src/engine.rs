//! Command handlers: the state machine that turns a parsed [`Request`] into
//! directory mutations and outbound replies.
//!
//! Every handler either returns the direct reply for the caller, or `None`
//! when the reply (if any) is entirely relayed to someone else. Cross-task
//! delivery goes through each session's outbox channel (`Directory::send_to`)
//! rather than a shared write lock — see `src/session.rs`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::commitment::{self, ShipPlacement};
use crate::directory::{Directory, GameId, SessionId, wait_for_games};
use crate::error::ProtocolError;
use crate::protocol::{self, Request};
use crate::sexpr::Expr;

pub type Shared = Rc<RefCell<Directory>>;

pub enum Outcome {
    Reply(Expr),
    NoReply,
}

pub async fn dispatch(
    dir: &Shared,
    session: SessionId,
    outbox: &crate::directory::Outbox,
    authenticated: &mut bool,
    line: &str,
) -> Result<Outcome, ProtocolError> {
    let expr = crate::sexpr::parse(line).map_err(|_| ProtocolError::Parse)?;
    let compound = expr.as_compound().ok_or(ProtocolError::Parse)?;
    let tag = compound.first().and_then(Expr::as_identifier).ok_or(ProtocolError::Parse)?;

    if !*authenticated {
        if tag != "nick" {
            return Err(ProtocolError::LoginRequired);
        }
        let Request::Nick { nick, client_salt } = protocol::parse_request("nick", compound)? else {
            unreachable!()
        };
        let server_salt = register_session(dir, session, &nick, &client_salt, outbox.clone())?;
        *authenticated = true;
        return Ok(Outcome::Reply(protocol::ok(&server_salt)));
    }

    if tag == "nick" {
        return Err(ProtocolError::AlreadyLoggedIn);
    }

    let request = protocol::parse_request(tag, compound)?;
    match request {
        Request::Nick { .. } => unreachable!("nick handled above"),
        Request::Start { hash } => handle_start(dir, session, hash).map(Outcome::Reply),
        Request::Auto { hash } => handle_auto(dir, session, hash).map(Outcome::Reply),
        Request::Join { game_id, hash } => handle_join(dir, session, game_id, hash).map(Outcome::Reply),
        Request::JoinPlayer { nick, hash } => handle_joinplayer(dir, session, nick, hash).map(Outcome::Reply),
        Request::List => {
            let entries = wait_for_games(dir).await;
            Ok(Outcome::Reply(protocol::games(entries)))
        }
        Request::Shoot { game_id, x, y } => handle_shoot(dir, session, game_id, x, y).map(|()| Outcome::NoReply),
        Request::Hit { game_id } => handle_adjudication(dir, session, game_id, true).map(|()| Outcome::NoReply),
        Request::Miss { game_id } => handle_adjudication(dir, session, game_id, false).map(|()| Outcome::NoReply),
        Request::Layout { game_id, ships } => {
            handle_layout(dir, session, game_id, ships).map(|()| Outcome::NoReply)
        }
    }
}

/// Registers a freshly authenticated player.
pub fn register_session(
    dir: &Shared,
    session: SessionId,
    nick: &str,
    client_salt: &str,
    outbox: crate::directory::Outbox,
) -> Result<String, ProtocolError> {
    if nick.is_empty() || !nick.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProtocolError::NickNotAlphanumeric);
    }
    let mut d = dir.borrow_mut();
    if d.nick_taken(nick) {
        return Err(ProtocolError::NickTaken(nick.to_string()));
    }
    let server_salt = commitment::generate_salt();
    d.register_player(session, nick.to_string(), client_salt.to_string(), server_salt.clone(), outbox);
    Ok(server_salt)
}

fn handle_start(dir: &Shared, session: SessionId, hash: String) -> Result<Expr, ProtocolError> {
    let mut d = dir.borrow_mut();
    if d.player_game(session).is_some() {
        return Err(ProtocolError::AlreadyInGame);
    }
    let game_id = d.create_game(session, hash);
    Ok(protocol::started(game_id))
}

fn handle_join(dir: &Shared, session: SessionId, game_id: GameId, hash: String) -> Result<Expr, ProtocolError> {
    let mut d = dir.borrow_mut();
    if d.player_game(session).is_some() {
        return Err(ProtocolError::AlreadyInGame);
    }
    let host = d.join_game(game_id, session, hash)?;
    d.send_to(host, protocol::game_joined(game_id));
    Ok(protocol::game_joined(game_id))
}

fn handle_auto(dir: &Shared, session: SessionId, hash: String) -> Result<Expr, ProtocolError> {
    let waiting = dir.borrow().find_any_waiting_game();
    match waiting {
        Some(game_id) => handle_join(dir, session, game_id, hash),
        None => handle_start(dir, session, hash),
    }
}

fn handle_joinplayer(dir: &Shared, session: SessionId, nick: String, hash: String) -> Result<Expr, ProtocolError> {
    let game_id = {
        let d = dir.borrow();
        let target_session =
            d.session_for_nick(&nick).ok_or_else(|| ProtocolError::UnknownPlayer(nick.clone()))?;
        let game_id = d
            .player_game(target_session)
            .ok_or_else(|| ProtocolError::PlayerHasNoWaitingGame(nick.clone()))?;
        if !d.game(game_id).is_some_and(crate::directory::Game::is_waiting) {
            return Err(ProtocolError::PlayerHasNoWaitingGame(nick));
        }
        game_id
    };
    handle_join(dir, session, game_id, hash)
}

fn handle_shoot(dir: &Shared, session: SessionId, game_id: GameId, x: u8, y: u8) -> Result<(), ProtocolError> {
    let mut d = dir.borrow_mut();
    let game = d.game_mut(game_id).ok_or(ProtocolError::UnknownGame(game_id))?;
    if !game.contains(session) {
        return Err(ProtocolError::NotInGame);
    }
    let target = game.other_slot_mut(session).ok_or(ProtocolError::NotInGame)?;
    if target.pending_shot.is_some() {
        return Err(ProtocolError::NotYourTurn);
    }
    target.pending_shot = Some((x, y));
    let target_session = if game.host.session == session {
        game.joiner.as_ref().map(|j| j.session)
    } else {
        Some(game.host.session)
    };
    drop(d);
    if let Some(target_session) = target_session {
        dir.borrow().send_to(target_session, protocol::shoot(game_id, x, y));
    }
    Ok(())
}

fn handle_adjudication(dir: &Shared, session: SessionId, game_id: GameId, hit: bool) -> Result<(), ProtocolError> {
    let mut d = dir.borrow_mut();
    let (shooter_session, just_ended_count) = {
        let game = d.game_mut(game_id).ok_or(ProtocolError::UnknownGame(game_id))?;
        if !game.contains(session) {
            return Err(ProtocolError::NotInGame);
        }
        let shooter_session = if game.host.session == session {
            game.joiner.as_ref().map(|j| j.session)
        } else {
            Some(game.host.session)
        };
        let own = game.own_slot_mut(session).ok_or(ProtocolError::NotInGame)?;
        let (x, y) = own.pending_shot.take().ok_or(ProtocolError::NotYourTurn)?;
        own.board_view.mark(x, y, hit);
        (shooter_session, own.board_view.hit_count())
    };
    let just_ended = hit && just_ended_count == 17;
    let winner_nick = if just_ended {
        shooter_session.and_then(|s| d.player(s).map(|p| p.nick.clone()))
    } else {
        None
    };
    if just_ended {
        if let Some(g) = d.game_mut(game_id) {
            g.ended = true;
        }
    }
    let host_session = d.game(game_id).map(|g| g.host.session);
    let joiner_session = d.game(game_id).and_then(|g| g.joiner.as_ref().map(|j| j.session));
    drop(d);

    if let Some(shooter) = shooter_session {
        let msg = if hit { protocol::hit(game_id) } else { protocol::miss(game_id) };
        dir.borrow().send_to(shooter, msg);
    }
    if let Some(winner_nick) = winner_nick {
        let end_msg = protocol::end(game_id, &winner_nick);
        if let Some(h) = host_session {
            dir.borrow().send_to(h, end_msg.clone());
        }
        if let Some(j) = joiner_session {
            dir.borrow().send_to(j, end_msg);
        }
    }
    Ok(())
}

fn handle_layout(
    dir: &Shared,
    session: SessionId,
    game_id: GameId,
    ships: [ShipPlacement; 5],
) -> Result<(), ProtocolError> {
    let mut d = dir.borrow_mut();
    let game = d.game_mut(game_id).ok_or(ProtocolError::UnknownGame(game_id))?;
    if !game.contains(session) {
        return Err(ProtocolError::NotInGame);
    }
    if !game.ended {
        return Err(ProtocolError::GameNotFinished);
    }
    {
        let own = game.own_slot_mut(session).ok_or(ProtocolError::NotInGame)?;
        if own.declared_layout.is_some() {
            return Err(ProtocolError::AlreadySubmittedLayout);
        }
        own.declared_layout = Some(ships);
    }
    let both_submitted =
        game.host.declared_layout.is_some() && game.joiner.as_ref().is_some_and(|j| j.declared_layout.is_some());
    if !both_submitted {
        return Ok(());
    }

    let (host_session, host_outcome, host_nick) = verify_slot(&d, game_id, true);
    let (joiner_session, joiner_outcome, joiner_nick) = verify_slot(&d, game_id, false);
    drop(d);

    let aborted = !host_outcome.hash_ok || !host_outcome.board_ok || !joiner_outcome.hash_ok || !joiner_outcome.board_ok;
    let mut mismatch_records = Vec::new();
    if !host_outcome.hash_ok {
        mismatch_records.push(protocol::hash_mismatch(&host_nick));
    }
    if !host_outcome.board_ok {
        mismatch_records.push(protocol::board_mismatch(&host_nick));
    }
    if !joiner_outcome.hash_ok {
        mismatch_records.push(protocol::hash_mismatch(&joiner_nick));
    }
    if !joiner_outcome.board_ok {
        mismatch_records.push(protocol::board_mismatch(&joiner_nick));
    }

    let dir_ref = dir.borrow();
    let final_msg = if aborted { protocol::game_aborted() } else { protocol::game_ok() };
    for session in [Some(host_session), Some(joiner_session)] {
        if let Some(s) = session {
            for record in &mismatch_records {
                dir_ref.send_to(s, record.clone());
            }
            dir_ref.send_to(s, final_msg.clone());
        }
    }
    drop(dir_ref);
    dir.borrow_mut().remove_game(game_id);
    Ok(())
}

struct VerifyOutcome {
    hash_ok: bool,
    board_ok: bool,
}

/// Verifies one side's revealed layout against its commitment hash and
/// against the shots the server actually recorded against it.
fn verify_slot(dir: &Directory, game_id: GameId, is_host: bool) -> (SessionId, VerifyOutcome, String) {
    let game = dir.game(game_id).expect("game present during verification");
    let slot = if is_host { &game.host } else { game.joiner.as_ref().expect("joiner present") };
    let player = dir.player(slot.session).expect("player present");
    let layout = slot.declared_layout.expect("layout submitted");

    let canonical = commitment::canonical_layout(&layout);
    let expected_hash = commitment::commitment_hash(&player.server_salt, &player.client_salt, &canonical);
    let hash_ok = expected_hash == slot.committed_hash;

    let mut board = [[false; 10]; 10];
    for ship in &layout {
        for (x, y) in ship.cells() {
            if (x as usize) < 10 && (y as usize) < 10 {
                board[y as usize][x as usize] = true;
            }
        }
    }
    let mut board_ok = true;
    for y in 0..10u8 {
        for x in 0..10u8 {
            let observed = slot.board_view.get(x, y);
            let has_ship = board[y as usize][x as usize];
            let consistent = match observed {
                crate::directory::Cell::Unknown => true,
                crate::directory::Cell::Hit => has_ship,
                crate::directory::Cell::Miss => !has_ship,
            };
            if !consistent {
                board_ok = false;
            }
        }
    }

    (slot.session, VerifyOutcome { hash_ok, board_ok }, player.nick.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::Orientation;
    use tokio::sync::mpsc;

    fn setup() -> Shared {
        Rc::new(RefCell::new(Directory::new()))
    }

    fn standard_layout() -> [ShipPlacement; 5] {
        [
            ShipPlacement { size: 5, x: 0, y: 0, orientation: Orientation::Horizontal },
            ShipPlacement { size: 4, x: 0, y: 1, orientation: Orientation::Horizontal },
            ShipPlacement { size: 3, x: 0, y: 2, orientation: Orientation::Horizontal },
            ShipPlacement { size: 3, x: 0, y: 3, orientation: Orientation::Horizontal },
            ShipPlacement { size: 2, x: 0, y: 4, orientation: Orientation::Horizontal },
        ]
    }

    fn register(dir: &Shared, session: SessionId, nick: &str) -> (mpsc::UnboundedReceiver<Expr>, String) {
        let (tx, rx) = mpsc::unbounded_channel();
        let server_salt = register_session(dir, session, nick, "csalt", tx).unwrap();
        (rx, server_salt)
    }

    fn dummy_outbox() -> crate::directory::Outbox {
        mpsc::unbounded_channel().0
    }

    #[tokio::test]
    async fn happy_path_win_and_verification() {
        let dir = setup();
        let out = dummy_outbox();
        let (mut host_rx, host_salt) = register(&dir, 1, "foo");
        let (mut joiner_rx, joiner_salt) = register(&dir, 2, "bar");

        let layout = standard_layout();
        let canonical = commitment::canonical_layout(&layout);
        let host_hash = commitment::commitment_hash(&host_salt, "csalt", &canonical);
        let joiner_hash = commitment::commitment_hash(&joiner_salt, "csalt", &canonical);

        let mut auth = true;
        let Outcome::Reply(started) =
            dispatch(&dir, 1, &out, &mut auth, &format!(r#"(start "{host_hash}")"#)).await.unwrap()
        else {
            panic!()
        };
        let game_id = match started {
            Expr::Compound(items) => items[1].as_integer().unwrap() as u64,
            _ => panic!(),
        };
        dispatch(&dir, 2, &out, &mut auth, &format!(r#"(join {game_id} "{joiner_hash}")"#)).await.unwrap();
        let _ = host_rx.try_recv(); // (game N joined) to host

        // bar shoots every cell foo occupies; foo always reports a hit.
        for ship in &layout {
            for (x, y) in ship.cells() {
                dispatch(&dir, 2, &out, &mut auth, &format!("(shoot {game_id} {x} {y})")).await.unwrap();
                let _ = host_rx.try_recv(); // (shoot ...) delivered to foo
                dispatch(&dir, 1, &out, &mut auth, &format!("(hit {game_id})")).await.unwrap();
                let _ = joiner_rx.try_recv(); // (hit ...) echoed back to bar
            }
        }

        assert!(dir.borrow().game(game_id).unwrap().ended);

        dispatch(&dir, 1, &out, &mut auth, &format!("(layout {game_id} {})", ships_text(&layout)))
            .await
            .unwrap();
        dispatch(&dir, 2, &out, &mut auth, &format!("(layout {game_id} {})", ships_text(&layout)))
            .await
            .unwrap();

        assert!(dir.borrow().game(game_id).is_none());
    }

    fn ships_text(ships: &[ShipPlacement; 5]) -> String {
        ships
            .iter()
            .map(|s| format!("(ship {} {} {} {})", s.size, s.x, s.y, s.orientation.as_identifier()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[tokio::test]
    async fn double_shoot_without_adjudication_is_rejected() {
        let dir = setup();
        let (_host_rx, host_salt) = register(&dir, 1, "foo");
        let (_joiner_rx, joiner_salt) = register(&dir, 2, "bar");
        let layout = standard_layout();
        let canonical = commitment::canonical_layout(&layout);
        let host_hash = commitment::commitment_hash(&host_salt, "csalt", &canonical);
        let joiner_hash = commitment::commitment_hash(&joiner_salt, "csalt", &canonical);
        let mut auth = true;
        let out = dummy_outbox();
        let Outcome::Reply(started) =
            dispatch(&dir, 1, &out, &mut auth, &format!(r#"(start "{host_hash}")"#)).await.unwrap()
        else {
            panic!()
        };
        let game_id = match started {
            Expr::Compound(items) => items[1].as_integer().unwrap() as u64,
            _ => panic!(),
        };
        dispatch(&dir, 2, &out, &mut auth, &format!(r#"(join {game_id} "{joiner_hash}")"#)).await.unwrap();
        dispatch(&dir, 2, &out, &mut auth, &format!("(shoot {game_id} 0 0)")).await.unwrap();
        let err = dispatch(&dir, 2, &out, &mut auth, &format!("(shoot {game_id} 1 1)")).await;
        assert!(matches!(err, Err(ProtocolError::NotYourTurn)));
    }
}
