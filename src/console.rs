use std::fmt::Write as _;
use std::fs;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::board::{Color, Destination, PieceKind, Position, Square};
use crate::error::EngineError;
use crate::movegen::TurnOutcome;
use crate::notation::interpret;
use crate::observer::TracingObserver;
use crate::replay::replay_batch;
use crate::search::{random_move, Search, SearchConfig};

/// Line-oriented host that drives one live game from stdin.
pub struct ConsoleHandler {
    position: Position,
    search_config: SearchConfig,
    awaiting_promotion: Option<Square>,
    rng: StdRng,
}

impl ConsoleHandler {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        let mut position = Position::new();
        position.attach_observer(Box::new(TracingObserver));
        ConsoleHandler {
            position,
            search_config: SearchConfig::default(),
            awaiting_promotion: None,
            rng,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut reader = stdin.lock();
        let mut line = String::new();

        while reader.read_line(&mut line)? > 0 {
            let command = line.trim();
            if command == "quit" {
                break;
            }
            match self.handle_command(command) {
                Ok(response) => print!("{}", response),
                Err(err) => {
                    warn!(%command, error = %err, "command rejected");
                    println!("error: {:#}", err);
                }
            }
            stdout.flush()?;
            line.clear();
        }
        Ok(())
    }

    pub fn handle_command(&mut self, command: &str) -> Result<String> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(String::new());
        }

        match parts[0] {
            "new" => Ok(self.handle_new()),
            "board" => Ok(self.position.to_string()),
            "moves" => self.handle_moves(&parts[1..]),
            "move" => self.handle_move(&parts[1..]),
            "promote" => self.handle_promote(&parts[1..]),
            "san" => self.handle_san(&parts[1..]),
            "go" => self.handle_go(&parts[1..]),
            "random" => self.handle_random(),
            "replay" => self.handle_replay(&parts[1..]),
            "tally" => self.handle_tally(),
            "quit" => Ok(String::new()),
            other => Err(EngineError::UnknownCommand(other.to_string()).into()),
        }
    }

    fn handle_new(&mut self) -> String {
        self.position.new_game();
        self.awaiting_promotion = None;
        "ok\n".to_string()
    }

    fn parse_square(arg: Option<&&str>) -> Result<Square> {
        let text = arg.ok_or_else(|| anyhow!("expected a square"))?;
        Ok(text.parse::<Square>()?)
    }

    fn handle_moves(&mut self, args: &[&str]) -> Result<String> {
        let square = Self::parse_square(args.first())?;
        let destinations = self.position.get_locations(square);
        let listed: Vec<String> = destinations.iter().map(|dest| dest.to_string()).collect();
        Ok(format!("{}\n", listed.join(" ")))
    }

    fn handle_move(&mut self, args: &[&str]) -> Result<String> {
        if let Some(square) = self.awaiting_promotion {
            bail!(EngineError::PromotionPending(square));
        }
        let from = Self::parse_square(args.first())?;
        let to = Self::parse_square(args.get(1))?;

        // The clicked square picks the destination; a castle is chosen by clicking its partner
        let destination = self
            .position
            .get_locations(from)
            .into_iter()
            .find(|dest| dest.square() == to)
            .ok_or(EngineError::IllegalMove { from, to })?;
        self.play(from, destination)
    }

    fn play(&mut self, from: Square, destination: Destination) -> Result<String> {
        let outcome = self.position.move_piece(from, destination)?;
        let mut response = String::new();
        if let Some(capture) = outcome.captured {
            writeln!(response, "captured {:?} {:?} (lost {})", capture.color, capture.kind, capture.tally)?;
        }
        if outcome.promotion_due {
            self.awaiting_promotion = Some(outcome.to);
            writeln!(response, "promote {} with: promote <q|r|b|n>", outcome.to)?;
            return Ok(response);
        }
        response.push_str(&self.finish_turn()?);
        Ok(response)
    }

    fn handle_promote(&mut self, args: &[&str]) -> Result<String> {
        let square = self
            .awaiting_promotion
            .ok_or_else(|| anyhow!("no pawn is waiting for promotion"))?;
        let letter = args
            .first()
            .and_then(|arg| arg.chars().next())
            .ok_or_else(|| anyhow!("expected a piece letter"))?;
        let kind = PieceKind::from_letter(letter.to_ascii_uppercase())
            .ok_or_else(|| anyhow!("unknown piece letter `{}`", letter))?;
        self.position.transform_pawn(square, kind)?;
        self.awaiting_promotion = None;
        self.finish_turn()
    }

    fn handle_san(&mut self, args: &[&str]) -> Result<String> {
        let token = args.first().ok_or_else(|| anyhow!("expected a move token"))?;
        let interpreted = interpret(&mut self.position, token)?;
        interpreted.apply(&mut self.position)?;
        self.finish_turn()
    }

    fn finish_turn(&mut self) -> Result<String> {
        match self.position.pass_turn()? {
            TurnOutcome::Continue(color) => Ok(format!("{:?} to move\n", color)),
            TurnOutcome::Finished(outcome) => Ok(match outcome.winner {
                Some(winner) => format!("{} {:?} wins\n", outcome.reason.as_str(), winner),
                None => format!("{}\n", outcome.reason.as_str()),
            }),
        }
    }

    fn handle_go(&mut self, parts: &[&str]) -> Result<String> {
        let mut config = self.search_config.with_agent(self.position.turn());
        config.max_time = None;

        for i in 0..parts.len() {
            match parts[i] {
                "depth" => {
                    if let Some(depth) = parts.get(i + 1).and_then(|s| s.parse::<u32>().ok()) {
                        config.depth = depth;
                    }
                }
                "movetime" => {
                    if let Some(time) = parts.get(i + 1).and_then(|s| s.parse::<u64>().ok()) {
                        config.max_time = Some(Duration::from_millis(time));
                    }
                }
                _ => {}
            }
        }

        let mut search = Search::new(config);
        match search.find_best_move(&self.position) {
            Ok(best) => Ok(format!(
                "bestmove {} {} value {:.3} nodes {}\n",
                best.origin,
                best.destination,
                best.value,
                search.get_nodes_searched()
            )),
            Err(EngineError::NoLegalMoves(_)) => Ok("bestmove (none)\n".to_string()),
            Err(err) => Err(err.into()),
        }
    }

    fn handle_random(&mut self) -> Result<String> {
        match random_move(&mut self.position, &mut self.rng) {
            Some((origin, destination)) => Ok(format!("{} {}\n", origin, destination)),
            None => Ok("(none)\n".to_string()),
        }
    }

    fn handle_replay(&mut self, args: &[&str]) -> Result<String> {
        let path = args.first().ok_or_else(|| anyhow!("expected a file path"))?;
        let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        let stats = replay_batch(contents.lines());
        Ok(format!(
            "games {} completed {} abandoned {} malformed {} moves {}\n",
            stats.games, stats.completed, stats.abandoned, stats.malformed_records, stats.moves_applied
        ))
    }

    fn handle_tally(&self) -> Result<String> {
        let mut response = String::new();
        for color in [Color::Black, Color::White] {
            let counts: Vec<String> = PieceKind::ALL
                .iter()
                .filter(|kind| **kind != PieceKind::King)
                .map(|kind| format!("{:?}={}", kind, self.position.lost().get(color, *kind)))
                .collect();
            writeln!(response, "{:?} lost: {}", color, counts.join(" "))?;
        }
        Ok(response)
    }
}

impl Default for ConsoleHandler {
    fn default() -> Self {
        ConsoleHandler::new()
    }
}
