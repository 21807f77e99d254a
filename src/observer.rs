use tracing::info;

use crate::board::{Color, PieceKind};
use crate::movegen::EndReason;

/// Notifications a hosting controller receives from a live [`Position`](crate::board::Position).
///
/// Both methods default to doing nothing so hosts only implement what they render.
pub trait GameObserver {
    /// A piece of `color` was captured; `tally` is that color's new count of lost `kind`s.
    fn on_piece_captured(&mut self, _color: Color, _kind: PieceKind, _tally: u8) {}

    /// `winner` is `None` on stalemate.
    fn on_game_over(&mut self, _reason: EndReason, _winner: Option<Color>) {}
}

/// Logs every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl GameObserver for TracingObserver {
    fn on_piece_captured(&mut self, color: Color, kind: PieceKind, tally: u8) {
        info!(?color, ?kind, tally, "piece lost");
    }

    fn on_game_over(&mut self, reason: EndReason, winner: Option<Color>) {
        match winner {
            Some(winner) => info!(reason = reason.as_str(), ?winner, "game finished"),
            None => info!(reason = reason.as_str(), "game drawn"),
        }
    }
}
