use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::movegen::GameOutcome;
use crate::observer::GameObserver;

pub const BOARD_SIZE: u8 = 8;
pub const ROSTER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

impl PieceKind {
    pub const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Rook,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Queen,
        PieceKind::King,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Parses an uppercase algebraic piece letter.
    pub fn from_letter(letter: char) -> Option<PieceKind> {
        match letter {
            'P' => Some(PieceKind::Pawn),
            'R' => Some(PieceKind::Rook),
            'N' => Some(PieceKind::Knight),
            'B' => Some(PieceKind::Bishop),
            'Q' => Some(PieceKind::Queen),
            'K' => Some(PieceKind::King),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Rook => 'R',
            PieceKind::Knight => 'N',
            PieceKind::Bishop => 'B',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        }
    }

    pub fn is_promotion_target(self) -> bool {
        matches!(
            self,
            PieceKind::Queen | PieceKind::Rook | PieceKind::Bishop | PieceKind::Knight
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opposite(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Color::Black => 0,
            Color::White => 1,
        }
    }

    /// Row delta of a pawn advance. Black starts on row 0 and moves down the grid.
    pub fn pawn_step(self) -> i8 {
        match self {
            Color::Black => 1,
            Color::White => -1,
        }
    }

    pub fn back_rank(self) -> u8 {
        match self {
            Color::Black => 0,
            Color::White => 7,
        }
    }

    pub fn promotion_row(self) -> u8 {
        self.opposite().back_rank()
    }
}

/// A board coordinate. Row 0 is Black's back rank (rank 8), column 0 is the a-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square {
    row: u8,
    column: u8,
}

impl Square {
    /// Panics when either coordinate is off the board; use [`Square::try_new`] for untrusted input.
    pub fn new(row: u8, column: u8) -> Self {
        assert!(row < BOARD_SIZE && column < BOARD_SIZE, "square ({row}, {column}) is off the board");
        Self { row, column }
    }

    pub fn try_new(row: i8, column: i8) -> Option<Self> {
        if (0..BOARD_SIZE as i8).contains(&row) && (0..BOARD_SIZE as i8).contains(&column) {
            Some(Self { row: row as u8, column: column as u8 })
        } else {
            None
        }
    }

    pub fn row(self) -> u8 {
        self.row
    }

    pub fn column(self) -> u8 {
        self.column
    }

    pub fn offset(self, rows: i8, columns: i8) -> Option<Square> {
        Square::try_new(self.row as i8 + rows, self.column as i8 + columns)
    }

    pub fn index(self) -> usize {
        self.row as usize * BOARD_SIZE as usize + self.column as usize
    }

    pub fn from_index(index: usize) -> Option<Square> {
        if index < 64 {
            Some(Square::new((index / 8) as u8, (index % 8) as u8))
        } else {
            None
        }
    }

    pub fn file_char(self) -> char {
        (b'a' + self.column) as char
    }

    pub fn rank_char(self) -> char {
        (b'0' + BOARD_SIZE - self.row) as char
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.file_char(), self.rank_char())
    }
}

impl FromStr for Square {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let (Some(file), Some(rank), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(EngineError::InvalidSquare(s.to_string()));
        };
        if !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
            return Err(EngineError::InvalidSquare(s.to_string()));
        }
        let column = file as u8 - b'a';
        let row = BOARD_SIZE - (rank as u8 - b'0');
        Ok(Square::new(row, column))
    }
}

/// Where a selected piece may go.
///
/// A castling destination names the partner piece's square (the rook when the
/// king is selected, the king when the rook is selected) together with the
/// king's column delta: +2 on the h-file side, -2 on the a-file side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Square(Square),
    Castle { partner: Square, delta: i8 },
}

impl Destination {
    /// The square a user would click to select this destination.
    pub fn square(&self) -> Square {
        match *self {
            Destination::Square(square) => square,
            Destination::Castle { partner, .. } => partner,
        }
    }

    pub fn is_castle(&self) -> bool {
        matches!(self, Destination::Castle { .. })
    }
}

impl From<Square> for Destination {
    fn from(square: Square) -> Self {
        Destination::Square(square)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Destination::Square(square) => write!(f, "{}", square),
            Destination::Castle { partner, delta } => {
                let label = if *delta > 0 { "O-O" } else { "O-O-O" };
                write!(f, "{}({})", partner, label)
            }
        }
    }
}

/// Stable identity of a piece: its color and its roster slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceId {
    pub color: Color,
    pub slot: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
    pub square: Square,
    pub has_moved: bool,
    slot: u8,
}

impl Piece {
    pub fn id(&self) -> PieceId {
        PieceId { color: self.color, slot: self.slot }
    }

    pub fn symbol(&self) -> char {
        match self.color {
            Color::White => self.kind.letter(),
            Color::Black => self.kind.letter().to_ascii_lowercase(),
        }
    }
}

/// Pieces lost per color per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTally {
    lost: [[u8; 6]; 2],
}

impl CaptureTally {
    pub fn get(&self, color: Color, kind: PieceKind) -> u8 {
        self.lost[color.index()][kind.index()]
    }

    fn record(&mut self, color: Color, kind: PieceKind) -> u8 {
        let count = &mut self.lost[color.index()][kind.index()];
        *count += 1;
        *count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub color: Color,
    pub kind: PieceKind,
    pub tally: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    pub piece: PieceId,
    pub from: Square,
    pub to: Square,
    pub captured: Option<Capture>,
    pub castled: bool,
    pub promotion_due: bool,
}

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

pub struct Position {
    grid: [[Option<PieceId>; 8]; 8],
    rosters: [[Option<Piece>; ROSTER_SIZE]; 2],
    deployed: [u8; 2],
    kings: [Option<PieceId>; 2],
    pub(crate) turn: Color,
    lost: CaptureTally,
    pub(crate) outcome: Option<GameOutcome>,
    pub(crate) observer: Option<Box<dyn GameObserver + Send>>,
}

impl Position {
    /// A position holding the standard opening deployment, White to move.
    pub fn new() -> Self {
        let mut position = Position::empty(Color::White);
        position.new_game();
        position
    }

    pub fn empty(turn: Color) -> Self {
        Self {
            grid: [[None; 8]; 8],
            rosters: [[None; ROSTER_SIZE]; 2],
            deployed: [0; 2],
            kings: [None; 2],
            turn,
            lost: CaptureTally::default(),
            outcome: None,
            observer: None,
        }
    }

    /// Resets to the opening deployment. Roster order is back rank left to
    /// right, then the pawn rank left to right. An attached observer is kept.
    pub fn new_game(&mut self) {
        let observer = self.observer.take();
        *self = Position::empty(Color::White);
        self.observer = observer;

        for color in [Color::Black, Color::White] {
            let back = color.back_rank();
            let pawns = (back as i8 + color.pawn_step()) as u8;
            for (column, &kind) in BACK_RANK.iter().enumerate() {
                self.deploy(color, kind, Square::new(back, column as u8));
            }
            for column in 0..BOARD_SIZE {
                self.deploy(color, PieceKind::Pawn, Square::new(pawns, column));
            }
        }
        debug!("new game deployed");
    }

    fn deploy(&mut self, color: Color, kind: PieceKind, square: Square) -> PieceId {
        let slot = self.deployed[color.index()];
        // Pieces placed off their home squares lose the double step or castling rights
        let back = color.back_rank();
        let start_row = (back as i8 + color.pawn_step()) as u8;
        let has_moved = match kind {
            PieceKind::Pawn => square.row != start_row,
            PieceKind::King => square.row != back || square.column != 4,
            PieceKind::Rook => square.row != back || (square.column != 0 && square.column != 7),
            _ => false,
        };
        let piece = Piece { kind, color, square, has_moved, slot };
        let id = piece.id();
        self.rosters[color.index()][slot as usize] = Some(piece);
        self.deployed[color.index()] += 1;
        self.grid[square.row as usize][square.column as usize] = Some(id);
        if kind == PieceKind::King {
            self.kings[color.index()] = Some(id);
        }
        id
    }

    /// Places a new piece into the next free roster slot of `color`.
    pub fn place(&mut self, color: Color, kind: PieceKind, square: Square) -> Result<PieceId> {
        if self.grid_at(square).is_some() {
            return Err(EngineError::SquareOccupied(square));
        }
        if kind == PieceKind::King && self.kings[color.index()].is_some() {
            return Err(EngineError::DuplicateKing(color));
        }
        if self.deployed[color.index()] as usize >= ROSTER_SIZE {
            return Err(EngineError::RosterFull(color));
        }
        Ok(self.deploy(color, kind, square))
    }

    /// Lifts a non-king piece off the board and empties its roster slot. Not a capture.
    pub fn remove(&mut self, square: Square) -> Result<Option<Piece>> {
        let Some(id) = self.grid_at(square) else {
            return Ok(None);
        };
        if Some(id) == self.kings[id.color.index()] {
            return Err(EngineError::KingRemoval);
        }
        self.grid[square.row as usize][square.column as usize] = None;
        Ok(self.rosters[id.color.index()][id.slot as usize].take())
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn lost(&self) -> &CaptureTally {
        &self.lost
    }

    pub fn outcome(&self) -> Option<GameOutcome> {
        self.outcome
    }

    pub fn attach_observer(&mut self, observer: Box<dyn GameObserver + Send>) {
        self.observer = Some(observer);
    }

    pub fn detach_observer(&mut self) -> Option<Box<dyn GameObserver + Send>> {
        self.observer.take()
    }

    pub(crate) fn grid_at(&self, square: Square) -> Option<PieceId> {
        self.grid[square.row as usize][square.column as usize]
    }

    pub fn get_piece(&self, square: Square) -> Option<&Piece> {
        self.grid_at(square).and_then(|id| self.piece(id))
    }

    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.rosters[id.color.index()][id.slot as usize].as_ref()
    }

    pub(crate) fn piece_mut(&mut self, id: PieceId) -> Option<&mut Piece> {
        self.rosters[id.color.index()][id.slot as usize].as_mut()
    }

    pub fn roster(&self, color: Color) -> &[Option<Piece>; ROSTER_SIZE] {
        &self.rosters[color.index()]
    }

    /// Live pieces of `color` currently standing on the grid, in roster order.
    pub fn pieces(&self, color: Color) -> impl Iterator<Item = &Piece> + '_ {
        self.rosters[color.index()]
            .iter()
            .flatten()
            .filter(move |piece| self.is_on_board(piece))
    }

    pub(crate) fn is_on_board(&self, piece: &Piece) -> bool {
        self.grid_at(piece.square) == Some(piece.id())
    }

    pub fn king(&self, color: Color) -> Option<&Piece> {
        self.kings[color.index()].and_then(|id| self.piece(id))
    }

    /// Independent clone for speculative play. Observers are not carried over.
    pub fn copy(&self) -> Position {
        Position {
            grid: self.grid,
            rosters: self.rosters,
            deployed: self.deployed,
            kings: self.kings,
            turn: self.turn,
            lost: self.lost,
            outcome: self.outcome,
            observer: None,
        }
    }

    /// Assigns `id` (or nothing) to `square`, keeping the piece's own square in step.
    pub(crate) fn set_piece(&mut self, id: Option<PieceId>, square: Square) {
        self.grid[square.row as usize][square.column as usize] = id;
        if let Some(piece) = id.and_then(|id| self.piece_mut(id)) {
            piece.square = square;
        }
    }

    /// Validates and applies a move for the piece on `from`.
    ///
    /// Only destinations returned by [`Position::get_locations`] are accepted.
    pub fn move_piece(&mut self, from: Square, destination: Destination) -> Result<MoveOutcome> {
        if self.outcome.is_some() {
            return Err(EngineError::GameOver);
        }
        let piece = *self.get_piece(from).ok_or(EngineError::NoPiece(from))?;
        if piece.color != self.turn {
            return Err(EngineError::OutOfTurn { color: piece.color });
        }
        if !self.legal_destinations(piece.id()).contains(&destination) {
            return Err(EngineError::IllegalMove { from, to: destination.square() });
        }
        self.apply_move(from, destination)
    }

    /// Applies a move without legality checks. Used on simulation copies.
    pub(crate) fn apply_move(&mut self, from: Square, destination: Destination) -> Result<MoveOutcome> {
        let piece = *self.get_piece(from).ok_or(EngineError::NoPiece(from))?;
        let id = piece.id();

        match destination {
            Destination::Castle { partner, delta } => {
                let partner_id = self
                    .grid_at(partner)
                    .ok_or(EngineError::IllegalMove { from, to: partner })?;
                let (king, king_from, rook, rook_from) = if piece.kind == PieceKind::King {
                    (id, from, partner_id, partner)
                } else {
                    (partner_id, partner, id, from)
                };

                let king_to = Square::new(king_from.row, (king_from.column as i8 + delta) as u8);
                let rook_step = if delta < 0 { 1 } else { -1 };
                let rook_to = Square::new(king_to.row, (king_to.column as i8 + rook_step) as u8);

                self.set_piece(None, king_from);
                self.set_piece(None, rook_from);
                self.set_piece(Some(king), king_to);
                self.set_piece(Some(rook), rook_to);
                for moved in [king, rook] {
                    if let Some(p) = self.piece_mut(moved) {
                        p.has_moved = true;
                    }
                }
                debug!(?piece.color, %king_to, %rook_to, "castled");

                Ok(MoveOutcome {
                    piece: id,
                    from,
                    to: if id == king { king_to } else { rook_to },
                    captured: None,
                    castled: true,
                    promotion_due: false,
                })
            }
            Destination::Square(to) => {
                let mut captured = None;
                if let Some(victim_id) = self.grid_at(to) {
                    if let Some(victim) = self.rosters[victim_id.color.index()][victim_id.slot as usize].take() {
                        let tally = self.lost.record(victim.color, victim.kind);
                        debug!(?victim.color, ?victim.kind, %to, tally, "piece captured");
                        if let Some(observer) = self.observer.as_mut() {
                            observer.on_piece_captured(victim.color, victim.kind, tally);
                        }
                        captured = Some(Capture { color: victim.color, kind: victim.kind, tally });
                    }
                }

                self.set_piece(None, from);
                self.set_piece(Some(id), to);
                if let Some(p) = self.piece_mut(id) {
                    p.has_moved = true;
                }
                debug!(?piece.color, ?piece.kind, %from, %to, "moved");

                Ok(MoveOutcome {
                    piece: id,
                    from,
                    to,
                    captured,
                    castled: false,
                    promotion_due: self.check_pawn_end(to),
                })
            }
        }
    }

    /// True when the piece on `square` is a pawn standing on its promotion row.
    pub fn check_pawn_end(&self, square: Square) -> bool {
        match self.get_piece(square) {
            Some(piece) => piece.kind == PieceKind::Pawn && piece.square.row == piece.color.promotion_row(),
            None => false,
        }
    }

    pub(crate) fn pending_promotion(&self, color: Color) -> Option<Square> {
        self.pieces(color)
            .find(|piece| self.check_pawn_end(piece.square))
            .map(|piece| piece.square)
    }

    /// Replaces the promoting pawn on `square` in its own roster slot.
    pub fn transform_pawn(&mut self, square: Square, kind: PieceKind) -> Result<()> {
        if !kind.is_promotion_target() || !self.check_pawn_end(square) {
            return Err(EngineError::InvalidPromotion(square));
        }
        let id = self.grid_at(square).ok_or(EngineError::NoPiece(square))?;
        let replacement = Piece {
            kind,
            color: id.color,
            square,
            has_moved: true,
            slot: id.slot,
        };
        self.rosters[id.color.index()][id.slot as usize] = Some(replacement);
        debug!(?id.color, ?kind, %square, "pawn promoted");
        Ok(())
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::new()
    }
}

impl Clone for Position {
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.grid == other.grid
            && self.rosters == other.rosters
            && self.deployed == other.deployed
            && self.kings == other.kings
            && self.turn == other.turn
            && self.lost == other.lost
            && self.outcome == other.outcome
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Position")
            .field("turn", &self.turn)
            .field("board", &self.to_string())
            .field("lost", &self.lost)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut result = String::new();
        for row in 0..BOARD_SIZE {
            result.push((b'0' + BOARD_SIZE - row) as char);
            result.push(' ');
            for column in 0..BOARD_SIZE {
                match self.get_piece(Square::new(row, column)) {
                    Some(piece) => result.push(piece.symbol()),
                    None => result.push('.'),
                }
                if column < 7 {
                    result.push(' ');
                }
            }
            result.push('\n');
        }
        result.push_str("  a b c d e f g h\n");
        write!(f, "{}", result)
    }
}
