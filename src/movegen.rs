use tracing::debug;

use crate::board::{Color, Destination, Piece, PieceId, PieceKind, Position, Square};
use crate::error::{EngineError, Result};

const ROOK_DIRECTIONS: [(i8, i8); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];
const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(-1, 1), (1, 1), (1, -1), (-1, -1)];
const QUEEN_DIRECTIONS: [(i8, i8); 8] = [
    (0, 1), (0, -1), (1, 0), (-1, 0),
    (-1, 1), (1, 1), (1, -1), (-1, -1),
];
const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (2, -1), (2, 1), (1, -2), (1, 2),
    (-1, -2), (-1, 2), (-2, -1), (-2, 1),
];
const KING_OFFSETS: [(i8, i8); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1), (0, 1),
    (1, -1), (1, 0), (1, 1),
];

/// One side of the board a king may castle towards.
struct CastleLane {
    rook_column: u8,
    between: &'static [u8],
    transit: &'static [u8],
    delta: i8,
}

const CASTLE_LANES: [CastleLane; 2] = [
    CastleLane { rook_column: 0, between: &[1, 2, 3], transit: &[3, 2], delta: -2 },
    CastleLane { rook_column: 7, between: &[5, 6], transit: &[5, 6], delta: 2 },
];

const KING_START_COLUMN: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Checkmate,
    Stalemate,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Checkmate => "Checkmate",
            EndReason::Stalemate => "Stalemate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOutcome {
    pub reason: EndReason,
    pub winner: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Play continues with this color to move.
    Continue(Color),
    Finished(GameOutcome),
}

/// Saved state of one simulated single-square move, enough to undo it exactly.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Simulation {
    piece: PieceId,
    from: Square,
    to: Square,
    displaced: Option<PieceId>,
}

impl Piece {
    /// Squares reachable by this piece's movement geometry, ignoring check.
    pub fn tentative_destinations(&self, position: &Position) -> Vec<Square> {
        let mut squares = Vec::with_capacity(16);
        self.visit_tentative(position, &mut |square| {
            squares.push(square);
            true
        });
        squares
    }

    /// Whether `target` is among this piece's tentative destinations.
    pub fn threatens(&self, position: &Position, target: Square) -> bool {
        let mut hit = false;
        self.visit_tentative(position, &mut |square| {
            hit = square == target;
            !hit
        });
        hit
    }

    // The visitor returns false to stop early; so does every helper below.
    fn visit_tentative<F: FnMut(Square) -> bool>(&self, position: &Position, visit: &mut F) -> bool {
        match self.kind {
            PieceKind::Pawn => self.visit_pawn(position, visit),
            PieceKind::Knight => self.visit_offsets(position, &KNIGHT_OFFSETS, visit),
            PieceKind::King => self.visit_offsets(position, &KING_OFFSETS, visit),
            PieceKind::Rook => self.visit_rays(position, &ROOK_DIRECTIONS, visit),
            PieceKind::Bishop => self.visit_rays(position, &BISHOP_DIRECTIONS, visit),
            PieceKind::Queen => self.visit_rays(position, &QUEEN_DIRECTIONS, visit),
        }
    }

    fn visit_pawn<F: FnMut(Square) -> bool>(&self, position: &Position, visit: &mut F) -> bool {
        let step = self.color.pawn_step();

        // Forward one, then two from an unmoved pawn
        if let Some(one) = self.square.offset(step, 0) {
            if position.get_piece(one).is_none() {
                if !visit(one) {
                    return false;
                }
                if !self.has_moved {
                    if let Some(two) = self.square.offset(step * 2, 0) {
                        if position.get_piece(two).is_none() && !visit(two) {
                            return false;
                        }
                    }
                }
            }
        }

        // Diagonal captures only onto enemy pieces
        for columns in [-1, 1] {
            if let Some(target) = self.square.offset(step, columns) {
                let enemy = position
                    .get_piece(target)
                    .map_or(false, |piece| piece.color != self.color);
                if enemy && !visit(target) {
                    return false;
                }
            }
        }
        true
    }

    fn visit_offsets<F: FnMut(Square) -> bool>(
        &self,
        position: &Position,
        offsets: &[(i8, i8)],
        visit: &mut F,
    ) -> bool {
        for &(rows, columns) in offsets {
            let Some(target) = self.square.offset(rows, columns) else {
                continue;
            };
            let blocked = position
                .get_piece(target)
                .map_or(false, |piece| piece.color == self.color);
            if !blocked && !visit(target) {
                return false;
            }
        }
        true
    }

    fn visit_rays<F: FnMut(Square) -> bool>(
        &self,
        position: &Position,
        directions: &[(i8, i8)],
        visit: &mut F,
    ) -> bool {
        for &(rows, columns) in directions {
            let mut current = self.square;
            while let Some(next) = current.offset(rows, columns) {
                match position.get_piece(next) {
                    None => {
                        if !visit(next) {
                            return false;
                        }
                    }
                    Some(piece) => {
                        // The first occupied square ends the ray; only enemies are included
                        if piece.color != self.color && !visit(next) {
                            return false;
                        }
                        break;
                    }
                }
                current = next;
            }
        }
        true
    }
}

impl Position {
    pub fn tentative_destinations(&self, square: Square) -> Vec<Square> {
        self.get_piece(square)
            .map(|piece| piece.tentative_destinations(self))
            .unwrap_or_default()
    }

    /// Legal destinations of the piece on `square`, castling included.
    ///
    /// Takes `&mut self` because candidates are simulated on the live grid and
    /// undone before returning; the position is left exactly as it was.
    pub fn get_locations(&mut self, square: Square) -> Vec<Destination> {
        match self.grid_at(square) {
            Some(id) => self.legal_destinations(id),
            None => Vec::new(),
        }
    }

    pub fn legal_destinations(&mut self, id: PieceId) -> Vec<Destination> {
        let Some(piece) = self.piece(id).copied() else {
            return Vec::new();
        };
        if !self.is_on_board(&piece) {
            return Vec::new();
        }

        let king_squares = [
            self.king(Color::Black).map(|king| king.square),
            self.king(Color::White).map(|king| king.square),
        ];

        let mut legal = Vec::new();
        for target in piece.tentative_destinations(self) {
            // Kings are never captured; the game ends by checkmate first
            if king_squares.contains(&Some(target)) {
                continue;
            }
            let simulation = self.simulate(id, target);
            let safe = !self.in_check(piece.color);
            self.restore(simulation);
            if safe {
                legal.push(Destination::Square(target));
            }
        }

        if matches!(piece.kind, PieceKind::King | PieceKind::Rook) {
            legal.extend(self.castling_destinations(&piece));
        }
        legal
    }

    /// True when any opposing piece on the board reaches `color`'s king.
    pub fn in_check(&self, color: Color) -> bool {
        let Some(king) = self.king(color) else {
            return false;
        };
        let target = king.square;
        self.pieces(color.opposite())
            .any(|piece| piece.threatens(self, target))
    }

    pub(crate) fn simulate(&mut self, piece: PieceId, to: Square) -> Simulation {
        let from = self.piece(piece).map(|p| p.square).unwrap_or(to);
        let displaced = self.grid_at(to);
        self.set_piece(None, from);
        self.set_piece(Some(piece), to);
        Simulation { piece, from, to, displaced }
    }

    pub(crate) fn restore(&mut self, simulation: Simulation) {
        let Simulation { piece, from, to, displaced } = simulation;
        // The displaced piece never had its own square changed
        self.set_piece(displaced, to);
        self.set_piece(Some(piece), from);
    }

    fn king_can_stand(&mut self, king: PieceId, color: Color, square: Square) -> bool {
        let simulation = self.simulate(king, square);
        let safe = !self.in_check(color);
        self.restore(simulation);
        safe
    }

    fn castling_destinations(&mut self, piece: &Piece) -> Vec<Destination> {
        let color = piece.color;
        let Some(king) = self.king(color).copied() else {
            return Vec::new();
        };
        if king.has_moved
            || king.square.row() != color.back_rank()
            || king.square.column() != KING_START_COLUMN
            || self.in_check(color)
        {
            return Vec::new();
        }

        let row = king.square.row();
        let mut destinations = Vec::new();
        for lane in &CASTLE_LANES {
            let rook_square = Square::new(row, lane.rook_column);
            let Some(rook) = self.get_piece(rook_square).copied() else {
                continue;
            };
            if rook.kind != PieceKind::Rook || rook.color != color || rook.has_moved {
                continue;
            }
            // A rook only offers its own castle
            if piece.kind == PieceKind::Rook && rook.id() != piece.id() {
                continue;
            }
            if lane
                .between
                .iter()
                .any(|&column| self.get_piece(Square::new(row, column)).is_some())
            {
                continue;
            }
            if !lane
                .transit
                .iter()
                .all(|&column| self.king_can_stand(king.id(), color, Square::new(row, column)))
            {
                continue;
            }

            let partner = if piece.kind == PieceKind::King { rook_square } else { king.square };
            destinations.push(Destination::Castle { partner, delta: lane.delta });
        }
        destinations
    }

    /// Every legal `(origin, destination)` pair for `color`, in roster order.
    pub fn all_legal_moves(&mut self, color: Color) -> Vec<(Square, Destination)> {
        let ids: Vec<PieceId> = self.pieces(color).map(|piece| piece.id()).collect();
        let mut moves = Vec::new();
        for id in ids {
            let Some(origin) = self.piece(id).map(|piece| piece.square) else {
                continue;
            };
            moves.extend(self.legal_destinations(id).into_iter().map(|dest| (origin, dest)));
        }
        moves
    }

    pub fn has_legal_move(&mut self, color: Color) -> bool {
        let ids: Vec<PieceId> = self.pieces(color).map(|piece| piece.id()).collect();
        ids.into_iter().any(|id| !self.legal_destinations(id).is_empty())
    }

    /// Hands the move to the other color and reports checkmate or stalemate.
    pub fn pass_turn(&mut self) -> Result<TurnOutcome> {
        if self.outcome.is_some() {
            return Err(EngineError::GameOver);
        }
        if let Some(square) = self.pending_promotion(self.turn) {
            return Err(EngineError::PromotionPending(square));
        }

        self.turn = self.turn.opposite();
        let to_move = self.turn;
        if self.has_legal_move(to_move) {
            return Ok(TurnOutcome::Continue(to_move));
        }

        let outcome = if self.in_check(to_move) {
            GameOutcome { reason: EndReason::Checkmate, winner: Some(to_move.opposite()) }
        } else {
            GameOutcome { reason: EndReason::Stalemate, winner: None }
        };
        self.outcome = Some(outcome);
        debug!(reason = outcome.reason.as_str(), winner = ?outcome.winner, "game over");
        if let Some(observer) = self.observer.as_mut() {
            observer.on_game_over(outcome.reason, outcome.winner);
        }
        Ok(TurnOutcome::Finished(outcome))
    }

    /// Flips the turn without any end-of-game bookkeeping. Search copies only.
    pub(crate) fn advance_turn(&mut self) {
        self.turn = self.turn.opposite();
    }
}
