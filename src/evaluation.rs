use crate::board::{Color, PieceKind, Position};

/// Material-only heuristic used by the search agent.
pub struct Evaluator {
    pub pawn_value: i32,
    pub knight_value: i32,
    pub bishop_value: i32,
    pub rook_value: i32,
    pub queen_value: i32,
    pub king_value: i32,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            pawn_value: 1,
            knight_value: 3,
            bishop_value: 3,
            rook_value: 3,
            queen_value: 10,
            king_value: 100,
        }
    }

    pub fn piece_value(&self, kind: PieceKind) -> i32 {
        match kind {
            PieceKind::Pawn => self.pawn_value,
            PieceKind::Knight => self.knight_value,
            PieceKind::Bishop => self.bishop_value,
            PieceKind::Rook => self.rook_value,
            PieceKind::Queen => self.queen_value,
            PieceKind::King => self.king_value,
        }
    }

    /// Material on the board of `color`.
    pub fn material(&self, position: &Position, color: Color) -> i32 {
        position
            .pieces(color)
            .map(|piece| self.piece_value(piece.kind))
            .sum()
    }

    /// Material balance seen from `perspective`: its pieces count up, the opponent's down.
    pub fn evaluate(&self, position: &Position, perspective: Color) -> i32 {
        self.material(position, perspective) - self.material(position, perspective.opposite())
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}
