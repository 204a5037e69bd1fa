use std::io::{self, Write as _};

use clap::{ArgAction, Parser};
use shipsock::client::{Battleship, default_fleet};
use shipsock::logger::Logger;
use shipsock::sexpr::Expr;
use tokio::io::{AsyncBufReadExt, BufReader};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name    = "shipsock-client",
    version,
    about   = "Battleship terminal client",
    long_about = "Connects to a shipsock-server socket and plays interactively.\n\
                  Commands once in a game:\n  \
                    shoot <x> <y>\n  \
                    hit | miss          (reply to an incoming shot)"
)]
struct Args {
    /// Unix socket path to connect to
    #[arg(short, long, default_value = "/tmp/shipsock.sock")]
    socket: String,

    /// Nickname to register with
    nick: String,

    /// Increase output verbosity (-v verbose, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn print_prompt() {
    print!("> ");
    io::stdout().flush().ok();
}

fn print_help() {
    println!("  Commands:");
    println!("    auto                  — join a waiting game or host one");
    println!("    start                 — host a new game");
    println!("    join <id>             — join a specific game");
    println!("    list                  — show open and active games");
    println!("    shoot <x> <y>         — fire at the opponent");
    println!("    hit | miss            — answer an incoming shot");
    println!("    layout                — reveal your fleet once the game ends");
}

/// Renders one server line for the terminal, and feeds game-ending frames
/// into the client's own `finished`/`won`/`draw`/`aborted` bookkeeping
/// before printing — the same accessors a non-interactive caller of
/// `shipsock::client` would rely on.
fn render_server_line(bs: &mut Battleship, expr: &Expr) -> String {
    let compound = match expr.as_compound() {
        Some(c) => c,
        None => return expr.to_string(),
    };
    match compound.first().and_then(Expr::as_identifier) {
        Some("shoot") => {
            if let [_, id, x, y] = compound {
                format!(
                    "Incoming shot on game {}: ({}, {}) — reply with 'hit' or 'miss'",
                    id, x, y
                )
            } else {
                expr.to_string()
            }
        }
        Some("hit") => "Direct hit!".to_string(),
        Some("miss") => "Miss.".to_string(),
        Some("end") => {
            if let [_, id, winner] = compound {
                let winner_nick = winner.as_str().unwrap_or("?");
                bs.record_end(winner_nick);
                format!("Game {id} over. Winner: {winner_nick}")
            } else {
                expr.to_string()
            }
        }
        Some("game") => {
            if compound.get(1).and_then(Expr::as_identifier) == Some("aborted") {
                bs.record_aborted();
            }
            expr.to_string()
        }
        Some("hash-mismatch") => format!("Commitment mismatch for {}", compound.get(1).map(Expr::to_string).unwrap_or_default()),
        Some("board-mismatch") => format!("Board mismatch for {}", compound.get(1).map(Expr::to_string).unwrap_or_default()),
        Some("games") => expr.to_string(),
        Some("error") => format!("Server error: {}", compound.get(1).map(Expr::to_string).unwrap_or_default()),
        _ => expr.to_string(),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let log = Logger::new(args.verbose);

    let mut bs = match Battleship::connect(&args.socket, &args.nick).await {
        Ok(bs) => bs,
        Err(e) => {
            eprintln!("failed to connect to {}: {e}", args.socket);
            std::process::exit(1);
        }
    };
    log.info(format!("connected as {}", bs.nick()));
    bs.put_ships(default_fleet());

    println!("Connected as {}. Type 'help' for commands.", bs.nick());
    print_help();
    print_prompt();

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = bs.next_line() => {
                match line {
                    Ok(Some(expr)) => {
                        log.trace(format!("<- {expr}"));
                        println!("\n{}", render_server_line(&mut bs, &expr));
                        if bs.finished() {
                            let outcome = if bs.draw() { "draw" } else if bs.won() { "win" } else { "loss" };
                            println!("({outcome})");
                        }
                        print_prompt();
                    }
                    Ok(None) => {
                        println!("\nServer closed the connection.");
                        break;
                    }
                    Err(e) => {
                        println!("\nConnection error: {e}");
                        break;
                    }
                }
            }
            result = stdin_lines.next_line() => {
                let raw = match result {
                    Ok(Some(l)) => l,
                    _ => { println!("\nInput closed."); break; }
                };
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    print_prompt();
                    continue;
                }
                if let Err(msg) = handle_command(&mut bs, trimmed).await {
                    println!("  ? {msg}");
                }
                print_prompt();
            }
        }
    }
}

async fn handle_command(bs: &mut Battleship, line: &str) -> Result<(), String> {
    let mut parts = line.split_whitespace();
    match parts.next().unwrap_or("") {
        "help" | "?" => print_help(),
        "auto" => {
            let id = bs.auto().await.map_err(|e| e.to_string())?;
            println!("  game {id}");
        }
        "start" => {
            let id = bs.start().await.map_err(|e| e.to_string())?;
            println!("  game {id} started, waiting for an opponent");
        }
        "join" => {
            let id: u64 = parts.next().ok_or("usage: join <id>")?.parse().map_err(|_| "bad game id")?;
            bs.join(id).await.map_err(|e| e.to_string())?;
            println!("  joined game {id}");
        }
        "list" => {
            let games = bs.list_games().await.map_err(|e| e.to_string())?;
            for g in games {
                println!("  {g}");
            }
        }
        "shoot" => {
            let x: u8 = parts.next().ok_or("usage: shoot <x> <y>")?.parse().map_err(|_| "bad x")?;
            let y: u8 = parts.next().ok_or("usage: shoot <x> <y>")?.parse().map_err(|_| "bad y")?;
            bs.shoot(x, y).await.map_err(|e| e.to_string())?;
        }
        "hit" => bs.reply_hit(true).await.map_err(|e| e.to_string())?,
        "miss" => bs.reply_hit(false).await.map_err(|e| e.to_string())?,
        "layout" => bs.submit_layout().await.map_err(|e| e.to_string())?,
        other => return Err(format!("unknown command '{other}'")),
    }
    Ok(())
}
