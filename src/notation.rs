use crate::board::{Color, Destination, MoveOutcome, PieceId, PieceKind, Position, Square};
use crate::error::{EngineError, Result};

/// Origin hint written between the piece letter and the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disambiguator {
    pub row: Option<u8>,
    pub column: Option<u8>,
}

impl Disambiguator {
    fn matches(&self, square: Square) -> bool {
        self.row.map_or(true, |row| square.row() == row)
            && self.column.map_or(true, |column| square.column() == column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveBody {
    Castle { kingside: bool },
    Piece {
        kind: PieceKind,
        disambiguator: Disambiguator,
        target: Square,
    },
}

/// A token classified by grammar alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    pub color: Color,
    pub move_number: u32,
    pub body: MoveBody,
    pub promotion: Option<PieceKind>,
    pub capture: bool,
    pub check: bool,
}

/// A token resolved against a position.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpretedMove {
    pub color: Color,
    pub move_number: u32,
    pub piece: PieceId,
    pub kind: PieceKind,
    pub origin: Square,
    pub destination: Destination,
    pub promotion: Option<PieceKind>,
    pub capture: bool,
    pub check: bool,
}

impl InterpretedMove {
    /// The square named by the record. For castling this is the rook's corner.
    pub fn target(&self) -> Square {
        self.destination.square()
    }

    /// Plays the move and any promotion it requests. The turn is not passed.
    pub fn apply(&self, position: &mut Position) -> Result<MoveOutcome> {
        let outcome = position.move_piece(self.origin, self.destination)?;
        if let Some(kind) = self.promotion {
            position.transform_pawn(outcome.to, kind)?;
        }
        Ok(outcome)
    }
}

fn malformed(token: &str, reason: &str) -> EngineError {
    EngineError::MalformedNotation {
        token: token.to_string(),
        reason: reason.to_string(),
    }
}

fn file_index(c: char) -> Option<u8> {
    ('a'..='h').contains(&c).then(|| c as u8 - b'a')
}

fn rank_row(c: char) -> Option<u8> {
    ('1'..='8').contains(&c).then(|| 8 - (c as u8 - b'0'))
}

/// Classifies a token such as `W12.O-O` or `B7.Nxc3+` without looking at a board.
pub fn parse_token(token: &str) -> Result<ParsedToken> {
    let token = token.trim();

    let (prefix, body) = token
        .split_once('.')
        .ok_or_else(|| malformed(token, "missing `.` after move number"))?;
    let mut prefix_chars = prefix.chars();
    let color = match prefix_chars.next() {
        Some('W') => Color::White,
        Some('B') => Color::Black,
        _ => return Err(malformed(token, "expected W or B color prefix")),
    };
    let digits = prefix_chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed(token, "invalid move number"));
    }
    let move_number = digits
        .parse::<u32>()
        .map_err(|_| malformed(token, "invalid move number"))?;

    // Check marker
    let (body, check) = match body.strip_suffix('+') {
        Some(rest) => (rest, true),
        None => (body, false),
    };

    // Promotion suffix
    let mut promotion = None;
    let mut body = body;
    if let Some((rest, letter)) = body.rsplit_once('=') {
        let mut letters = letter.chars();
        let kind = match (letters.next(), letters.next()) {
            (Some(l), None) => PieceKind::from_letter(l).filter(|kind| kind.is_promotion_target()),
            _ => None,
        };
        promotion = Some(kind.ok_or_else(|| malformed(token, "invalid promotion piece"))?);
        body = rest;
    }

    // Castling
    if body == "O-O" || body == "O-O-O" {
        if promotion.is_some() {
            return Err(malformed(token, "castling cannot promote"));
        }
        return Ok(ParsedToken {
            color,
            move_number,
            body: MoveBody::Castle { kingside: body == "O-O" },
            promotion,
            capture: false,
            check,
        });
    }

    let chars: Vec<char> = body.chars().collect();
    if chars.len() < 2 {
        return Err(malformed(token, "missing destination square"));
    }
    let (head, tail) = chars.split_at(chars.len() - 2);
    let target = match (file_index(tail[0]), rank_row(tail[1])) {
        (Some(column), Some(row)) => Square::new(row, column),
        _ => return Err(malformed(token, "invalid destination square")),
    };

    let mut head = head;
    let mut capture = false;
    if let Some((&'x', rest)) = head.split_last() {
        capture = true;
        head = rest;
    }

    let mut kind = PieceKind::Pawn;
    if let Some((&letter, rest)) = head.split_first() {
        if letter.is_ascii_uppercase() {
            kind = PieceKind::from_letter(letter)
                .filter(|kind| *kind != PieceKind::Pawn)
                .ok_or_else(|| malformed(token, "unknown piece letter"))?;
            head = rest;
        }
    }

    let mut disambiguator = Disambiguator::default();
    match head {
        [] => {}
        [c] => {
            if let Some(column) = file_index(*c) {
                disambiguator.column = Some(column);
            } else if let Some(row) = rank_row(*c) {
                disambiguator.row = Some(row);
            } else {
                return Err(malformed(token, "invalid disambiguator"));
            }
        }
        [file, rank] => {
            disambiguator.column = Some(file_index(*file).ok_or_else(|| malformed(token, "invalid disambiguator"))?);
            disambiguator.row = Some(rank_row(*rank).ok_or_else(|| malformed(token, "invalid disambiguator"))?);
        }
        _ => return Err(malformed(token, "unexpected characters before destination")),
    }

    if promotion.is_some() && (kind != PieceKind::Pawn || target.row() != color.promotion_row()) {
        return Err(malformed(token, "promotion only applies to a pawn reaching the last rank"));
    }

    Ok(ParsedToken {
        color,
        move_number,
        body: MoveBody::Piece { kind, disambiguator, target },
        promotion,
        capture,
        check,
    })
}

/// Parses `token` and resolves it to exactly one piece of its color in `position`.
pub fn interpret(position: &mut Position, token: &str) -> Result<InterpretedMove> {
    let parsed = parse_token(token)?;
    let color = parsed.color;

    let (piece, origin, kind, destination) = match parsed.body {
        MoveBody::Castle { kingside } => {
            let king = *position
                .king(color)
                .ok_or_else(|| EngineError::Ambiguous { token: token.trim().to_string(), candidates: 0 })?;
            let rook_corner = Square::new(king.square.row(), if kingside { 7 } else { 0 });
            let wanted = if kingside { 2 } else { -2 };
            let destination = position
                .legal_destinations(king.id())
                .into_iter()
                .find(|dest| matches!(dest, Destination::Castle { delta, .. } if *delta == wanted))
                .ok_or(EngineError::IllegalMove { from: king.square, to: rook_corner })?;
            (king.id(), king.square, PieceKind::King, destination)
        }
        MoveBody::Piece { kind, disambiguator, target } => {
            let ids: Vec<(PieceId, Square)> = position
                .pieces(color)
                .filter(|piece| piece.kind == kind && disambiguator.matches(piece.square))
                .map(|piece| (piece.id(), piece.square))
                .collect();

            let wanted = Destination::Square(target);
            let candidates: Vec<(PieceId, Square)> = ids
                .into_iter()
                .filter(|(id, _)| position.legal_destinations(*id).contains(&wanted))
                .collect();

            match candidates.as_slice() {
                [(id, origin)] => (*id, *origin, kind, wanted),
                _ => {
                    return Err(EngineError::Ambiguous {
                        token: token.trim().to_string(),
                        candidates: candidates.len(),
                    })
                }
            }
        }
    };

    Ok(InterpretedMove {
        color,
        move_number: parsed.move_number,
        piece,
        kind,
        origin,
        destination,
        promotion: parsed.promotion,
        capture: parsed.capture,
        check: parsed.check,
    })
}
