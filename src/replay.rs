use std::ops::AddAssign;
use std::str::FromStr;
use std::thread;

use tracing::{info, warn};

use crate::board::{Destination, MoveOutcome, PieceKind, Position};
use crate::error::{EngineError, Result};
use crate::movegen::TurnOutcome;
use crate::notation::{interpret, InterpretedMove};

const CHECK_REWARD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameResult {
    pub fn from_code(code: &str) -> Option<GameResult> {
        match code.trim() {
            "W" => Some(GameResult::WhiteWins),
            "B" => Some(GameResult::BlackWins),
            "D" => Some(GameResult::Draw),
            _ => None,
        }
    }

    /// Reward assigned to the final move, from White's side.
    pub fn terminal_reward(self) -> f64 {
        match self {
            GameResult::WhiteWins => 1.0,
            GameResult::BlackWins => -1.0,
            GameResult::Draw => 0.0,
        }
    }
}

/// One line of a recorded-game file: `Result,Move1,Move2,...`.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub result: GameResult,
    pub moves: Vec<String>,
}

impl FromStr for GameRecord {
    type Err = EngineError;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = line.trim().split(',');
        let code = fields.next().unwrap_or_default();
        let result = GameResult::from_code(code)
            .ok_or_else(|| EngineError::MalformedRecord(format!("unknown result `{}`", code)))?;
        let moves: Vec<String> = fields
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        if moves.is_empty() {
            return Err(EngineError::MalformedRecord("record has no moves".to_string()));
        }
        Ok(GameRecord { result, moves })
    }
}

/// Reward for a move about to be played: the value of what actually stands on
/// the target square, plus a bonus when the record marks check.
pub fn move_reward(position: &Position, mv: &InterpretedMove) -> f64 {
    let captured = match mv.destination {
        Destination::Square(target) => position
            .get_piece(target)
            .filter(|piece| piece.color != mv.color)
            .map(|piece| piece.kind),
        Destination::Castle { .. } => None,
    };
    let capture_reward = match captured {
        Some(PieceKind::Queen) => 0.3,
        Some(PieceKind::Rook | PieceKind::Bishop | PieceKind::Knight) => 0.2,
        Some(PieceKind::Pawn) => 0.1,
        Some(PieceKind::King) | None => 0.0,
    };
    capture_reward + if mv.check { CHECK_REWARD } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayStep {
    pub interpreted: InterpretedMove,
    pub outcome: MoveOutcome,
    pub turn: TurnOutcome,
    pub reward: f64,
    pub done: bool,
}

/// Iterator over the moves of one recorded game, played on its own position.
///
/// Yields `Err` once for the first token that fails and then stops.
pub struct GameReplay {
    position: Position,
    record: GameRecord,
    next: usize,
    failed: bool,
}

impl GameReplay {
    pub fn new(record: GameRecord) -> Self {
        Self {
            position: Position::new(),
            record,
            next: 0,
            failed: false,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn into_position(self) -> Position {
        self.position
    }

    fn step(&mut self) -> Result<ReplayStep> {
        let index = self.next;
        let token = &self.record.moves[index];
        let done = index + 1 == self.record.moves.len();

        let interpreted = interpret(&mut self.position, token)?;
        let mut reward = move_reward(&self.position, &interpreted);
        let outcome = interpreted.apply(&mut self.position)?;
        let turn = self.position.pass_turn()?;
        if done {
            reward = self.record.result.terminal_reward();
        }
        Ok(ReplayStep { interpreted, outcome, turn, reward, done })
    }
}

impl Iterator for GameReplay {
    type Item = Result<ReplayStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next >= self.record.moves.len() {
            return None;
        }
        let step = self.step();
        match &step {
            Ok(_) => self.next += 1,
            Err(_) => self.failed = true,
        }
        Some(step)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub games: usize,
    pub completed: usize,
    pub abandoned: usize,
    pub malformed_records: usize,
    pub moves_applied: usize,
}

impl AddAssign for BatchStats {
    fn add_assign(&mut self, other: Self) {
        self.games += other.games;
        self.completed += other.completed;
        self.abandoned += other.abandoned;
        self.malformed_records += other.malformed_records;
        self.moves_applied += other.moves_applied;
    }
}

fn is_header(line: &str) -> bool {
    line.trim_start().starts_with("winner")
}

/// Replays one line and folds the result into `stats`.
fn replay_line(line_number: usize, line: &str, stats: &mut BatchStats) {
    if line.trim().is_empty() || is_header(line) {
        return;
    }
    stats.games += 1;

    let record = match line.parse::<GameRecord>() {
        Ok(record) => record,
        Err(err) => {
            warn!(line = line_number, error = %err, "skipping malformed record");
            stats.malformed_records += 1;
            return;
        }
    };

    for step in GameReplay::new(record) {
        match step {
            Ok(_) => stats.moves_applied += 1,
            Err(err) => {
                warn!(line = line_number, error = %err, "abandoning game");
                stats.abandoned += 1;
                return;
            }
        }
    }
    stats.completed += 1;
}

pub fn replay_batch<'a, I>(lines: I) -> BatchStats
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stats = BatchStats::default();
    for (index, line) in lines.into_iter().enumerate() {
        replay_line(index + 1, line, &mut stats);
    }
    info!(
        games = stats.games,
        completed = stats.completed,
        abandoned = stats.abandoned,
        malformed = stats.malformed_records,
        moves = stats.moves_applied,
        "batch replayed"
    );
    stats
}

/// Splits `lines` across `workers` threads, each replaying on its own positions.
pub fn replay_batch_parallel(lines: &[&str], workers: usize) -> BatchStats {
    let workers = workers.max(1);
    let chunk_size = ((lines.len() + workers - 1) / workers).max(1);

    let mut stats = BatchStats::default();
    thread::scope(|scope| {
        let handles: Vec<_> = lines
            .chunks(chunk_size)
            .enumerate()
            .map(|(chunk_index, chunk)| {
                scope.spawn(move || {
                    let mut local = BatchStats::default();
                    for (offset, line) in chunk.iter().enumerate() {
                        replay_line(chunk_index * chunk_size + offset + 1, line, &mut local);
                    }
                    local
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(local) => stats += local,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    });
    info!(games = stats.games, completed = stats.completed, workers, "parallel batch replayed");
    stats
}
