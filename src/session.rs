//! Per-connection task: one per accepted socket.
//!
//! Reads newline-framed commands, dispatches them through `engine::dispatch`,
//! and writes back either a direct reply or a translated `(error "...")`.
//! Cross-task deliveries (shot relays, `(end ...)`, verification records)
//! arrive on this session's own outbox channel and are written from the same
//! loop — one task always owns its write half, so no write lock is needed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;

use crate::directory::{Directory, SessionId};
use crate::engine::{self, Outcome};
use crate::logger::Logger;
use crate::protocol;

pub enum Event {
    Connected { session: SessionId },
    Disconnected { session: SessionId },
    Line { session: SessionId, raw: String },
    Rejected { session: SessionId, reason: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Connected { session } => write!(f, "session {session} connected"),
            Event::Disconnected { session } => write!(f, "session {session} disconnected"),
            Event::Line { session, raw } => write!(f, "session {session} <- {raw}"),
            Event::Rejected { session, reason } => write!(f, "session {session} rejected: {reason}"),
        }
    }
}

pub async fn run_session(
    stream: UnixStream,
    session: SessionId,
    dir: Rc<RefCell<Directory>>,
    log: Rc<Logger>,
) {
    log.verbose(Event::Connected { session });

    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
    let mut authenticated = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(raw)) => {
                        log.trace(Event::Line { session, raw: raw.clone() });
                        match engine::dispatch(&dir, session, &outbox_tx, &mut authenticated, &raw).await {
                            Ok(Outcome::Reply(expr)) => {
                                if write_line(&mut writer, &expr.to_string()).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Outcome::NoReply) => {}
                            Err(err) => {
                                log.verbose(Event::Rejected { session, reason: err.to_string() });
                                let expr = protocol::error(&err);
                                if write_line(&mut writer, &expr.to_string()).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            Some(msg) = outbox_rx.recv() => {
                if write_line(&mut writer, &msg.to_string()).await.is_err() {
                    break;
                }
            }
        }
    }

    dir.borrow_mut().remove_player(session);
    log.verbose(Event::Disconnected { session });
}

async fn write_line(writer: &mut tokio::net::unix::OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}
