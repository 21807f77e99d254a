use crate::board::{Color, PieceKind, Position, Square, ROSTER_SIZE};

// Per roster slot: legal targets, occupancy, kind one-hot
pub const SQUARES: usize = 64;
pub const KIND_FEATURES: usize = 6;
pub const PIECE_FEATURES: usize = SQUARES * 2 + KIND_FEATURES;
pub const STATE_SIZE: usize = PIECE_FEATURES * ROSTER_SIZE * 2;
/// One output per (roster slot, target square) for a single color.
pub const ACTION_SIZE: usize = ROSTER_SIZE * SQUARES;

pub fn kind_index(kind: PieceKind) -> usize {
    match kind {
        PieceKind::Rook => 0,
        PieceKind::Knight => 1,
        PieceKind::Bishop => 2,
        PieceKind::Queen => 3,
        PieceKind::King => 4,
        PieceKind::Pawn => 5,
    }
}

/// Takes `&mut` because legal destinations are computed by simulation.
pub fn encode_state(position: &mut Position) -> Vec<f32> {
    // Black's 16 slots first; empty slots stay zero so indices survive captures
    let mut state = vec![0.0; STATE_SIZE];
    for (color_offset, color) in [Color::Black, Color::White].into_iter().enumerate() {
        for slot in 0..ROSTER_SIZE {
            let Some(piece) = position.roster(color)[slot] else {
                continue;
            };
            let base = (color_offset * ROSTER_SIZE + slot) * PIECE_FEATURES;
            for destination in position.legal_destinations(piece.id()) {
                state[base + destination.square().index()] = 1.0;
            }
            state[base + SQUARES + piece.square.index()] = 1.0;
            state[base + SQUARES * 2 + kind_index(piece.kind)] = 1.0;
        }
    }
    state
}

pub fn action_index(slot: usize, target: Square) -> Option<usize> {
    (slot < ROSTER_SIZE).then(|| slot * SQUARES + target.index())
}

pub fn decode_action(index: usize) -> Option<(usize, Square)> {
    if index >= ACTION_SIZE {
        return None;
    }
    Some((index / SQUARES, Square::from_index(index % SQUARES)?))
}

/// `true` at every action index `color` could legally play right now.
pub fn legal_action_mask(position: &mut Position, color: Color) -> Vec<bool> {
    let mut mask = vec![false; ACTION_SIZE];
    for slot in 0..ROSTER_SIZE {
        let Some(piece) = position.roster(color)[slot] else {
            continue;
        };
        for destination in position.legal_destinations(piece.id()) {
            if let Some(index) = action_index(slot, destination.square()) {
                mask[index] = true;
            }
        }
    }
    mask
}
