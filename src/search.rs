use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, trace};

use crate::board::{Color, Destination, PieceKind, Position, Square};
use crate::error::{EngineError, Result};
use crate::evaluation::Evaluator;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Number of agent/opponent ply pairs to look ahead.
    pub depth: u32,
    /// The maximizing side.
    pub agent: Color,
    pub max_time: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            agent: Color::Black,
            max_time: None,
        }
    }
}

impl SearchConfig {
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_agent(mut self, agent: Color) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub origin: Square,
    pub destination: Destination,
    pub value: f64,
}

/// Fixed-depth expectimax over position copies.
///
/// The agent's nodes take the maximum; the opponent's nodes take the mean of
/// all replies, modelling an opponent that plays uniformly at random.
pub struct Search {
    evaluator: Evaluator,
    config: SearchConfig,
    cancel: Arc<AtomicBool>,
    nodes_searched: u64,
    start_time: Instant,
}

impl Search {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            evaluator: Evaluator::new(),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            nodes_searched: 0,
            start_time: Instant::now(),
        }
    }

    /// Shares an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn set_max_depth(&mut self, depth: u32) {
        self.config.depth = depth;
    }

    pub fn set_max_time(&mut self, max_time: Option<Duration>) {
        self.config.max_time = max_time;
    }

    pub fn set_agent(&mut self, agent: Color) {
        self.config.agent = agent;
    }

    pub fn get_nodes_searched(&self) -> u64 {
        self.nodes_searched
    }

    fn should_stop(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
            || self
                .config
                .max_time
                .map_or(false, |limit| self.start_time.elapsed() > limit)
    }

    /// Best root move for the agent. `NoLegalMoves` means the game is over for it.
    ///
    /// Cancellation and the time limit are checked between root branches, and
    /// the best branch finished so far is returned.
    pub fn find_best_move(&mut self, position: &Position) -> Result<SearchResult> {
        self.nodes_searched = 0;
        self.start_time = Instant::now();
        let agent = self.config.agent;

        let mut root = position.copy();
        let moves = root.all_legal_moves(agent);
        if moves.is_empty() {
            return Err(EngineError::NoLegalMoves(agent));
        }

        let mut best: Option<SearchResult> = None;
        for (origin, destination) in moves {
            if best.is_some() && self.should_stop() {
                debug!(nodes = self.nodes_searched, "search stopped early");
                break;
            }
            let child = play_copy(&root, origin, destination)?;
            let value = self.expectimax(&child, self.config.depth, agent.opposite())?;
            trace!(%origin, %destination, value, "root branch");

            if best.map_or(true, |best| value > best.value) {
                best = Some(SearchResult { origin, destination, value });
            }
        }

        let best = best.ok_or(EngineError::NoLegalMoves(agent))?;
        debug!(
            origin = %best.origin,
            destination = %best.destination,
            value = best.value,
            nodes = self.nodes_searched,
            "search finished"
        );
        Ok(best)
    }

    fn expectimax(&mut self, position: &Position, ply: u32, turn: Color) -> Result<f64> {
        self.nodes_searched += 1;
        let agent = self.config.agent;
        let leaf_value = || self.evaluator.evaluate(position, agent) as f64;

        if ply == 0 {
            return Ok(leaf_value());
        }
        let mut scratch = position.copy();
        let moves = scratch.all_legal_moves(turn);
        if moves.is_empty() {
            return Ok(leaf_value());
        }

        if turn == agent {
            let mut best = f64::NEG_INFINITY;
            for (origin, destination) in moves {
                let child = play_copy(&scratch, origin, destination)?;
                best = best.max(self.expectimax(&child, ply, agent.opposite())?);
            }
            Ok(best)
        } else {
            let count = moves.len() as f64;
            let mut total = 0.0;
            for (origin, destination) in moves {
                let child = play_copy(&scratch, origin, destination)?;
                total += self.expectimax(&child, ply - 1, agent)?;
            }
            Ok(total / count)
        }
    }

    /// Runs a search on its own thread over an owned copy of `position`.
    pub fn spawn(position: &Position, config: SearchConfig) -> SearchHandle {
        let search = Search::new(config);
        let cancel = search.cancel_flag();
        let snapshot = position.copy();
        let handle = thread::spawn(move || {
            let mut search = search;
            search.find_best_move(&snapshot)
        });
        SearchHandle { cancel, handle }
    }
}

/// A search running on a background thread.
pub struct SearchHandle {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<Result<SearchResult>>,
}

impl SearchHandle {
    /// Asks the search to stop after the current root branch.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<SearchResult> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Plays one move on a copy, promoting to a queen if needed, and hands the turn over.
fn play_copy(position: &Position, origin: Square, destination: Destination) -> Result<Position> {
    let mut child = position.copy();
    let outcome = child.apply_move(origin, destination)?;
    if outcome.promotion_due {
        child.transform_pawn(outcome.to, PieceKind::Queen)?;
    }
    child.advance_turn();
    Ok(child)
}

/// A uniformly random legal move for the side to move.
pub fn random_move<R: Rng + ?Sized>(position: &mut Position, rng: &mut R) -> Option<(Square, Destination)> {
    let moves = position.all_legal_moves(position.turn());
    moves.choose(rng).copied()
}
