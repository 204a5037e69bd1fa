use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use clap::{ArgAction, Parser};
use shipsock::directory::Directory;
use shipsock::logger::Logger;
use shipsock::session::run_session;
use tokio::net::UnixListener;
use tokio::task::LocalSet;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name    = "shipsock-server",
    version,
    about   = "Battleship matchmaking and arbitration server",
    long_about = "Accepts Unix-domain socket clients, matches them into games, and \
                  adjudicates shots without ever seeing either side's fleet. See \
                  src/protocol.rs for the wire format."
)]
struct Args {
    /// Unix socket path to listen on
    #[arg(short, long, default_value = "/tmp/shipsock.sock")]
    socket: String,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

enum Event {
    Listening { path: String },
    AcceptError { reason: String },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Listening { path } => write!(f, "listening on {path}"),
            Event::AcceptError { reason } => write!(f, "accept error: {reason}"),
        }
    }
}

// Single-threaded on purpose: all shared state lives behind an `Rc<RefCell<..>>`
// rather than an `Arc<Mutex<..>>`, so every session task must run on the same
// thread. `LocalSet` is what lets `tokio::task::spawn_local` coexist with the
// `#[tokio::main]` runtime below.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let log = Rc::new(Logger::new(args.verbose));

    // A stale socket file from a previous, uncleanly-terminated run would
    // otherwise make `bind` fail with "address in use".
    let _ = std::fs::remove_file(&args.socket);

    let listener = UnixListener::bind(&args.socket).unwrap_or_else(|e| {
        eprintln!("failed to bind {}: {e}", args.socket);
        std::process::exit(1);
    });

    log.info(Event::Listening { path: args.socket.clone() });

    let dir = Rc::new(RefCell::new(Directory::new()));
    let local = LocalSet::new();

    local
        .run_until(async move {
            loop {
                let (stream, _addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        log.warn(Event::AcceptError { reason: e.to_string() });
                        continue;
                    }
                };

                let session_id = dir.borrow_mut().allocate_session_id();
                let dir = Rc::clone(&dir);
                let log = Rc::clone(&log);
                tokio::task::spawn_local(async move {
                    run_session(stream, session_id, dir, log).await;
                });
            }
        })
        .await;
}
