pub mod board;
pub mod console;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod movegen;
pub mod notation;
pub mod observer;
pub mod replay;
pub mod search;

pub use board::{Color, Destination, Piece, PieceId, PieceKind, Position, Square};
pub use error::{EngineError, Result};
pub use movegen::{EndReason, GameOutcome, TurnOutcome};
pub use observer::GameObserver;

#[cfg(test)]
mod tests {
    use super::*;
    use notation::interpret;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use search::{random_move, Search, SearchConfig};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Captured(Color, PieceKind, u8),
        GameOver(EndReason, Option<Color>),
    }

    #[derive(Clone, Default)]
    struct RecordingObserver {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl GameObserver for RecordingObserver {
        fn on_piece_captured(&mut self, color: Color, kind: PieceKind, tally: u8) {
            self.events.lock().unwrap().push(Event::Captured(color, kind, tally));
        }

        fn on_game_over(&mut self, reason: EndReason, winner: Option<Color>) {
            self.events.lock().unwrap().push(Event::GameOver(reason, winner));
        }
    }

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    fn play(position: &mut Position, from: &str, to: &str) -> TurnOutcome {
        position.move_piece(sq(from), Destination::Square(sq(to))).unwrap();
        position.pass_turn().unwrap()
    }

    fn castles(destinations: &[Destination]) -> Vec<Destination> {
        destinations.iter().copied().filter(|dest| dest.is_castle()).collect()
    }

    #[test]
    fn test_initial_position() {
        let mut position = Position::new();
        assert_eq!(position.turn(), Color::White);
        assert_eq!(position.all_legal_moves(Color::White).len(), 20);
        assert_eq!(position.all_legal_moves(Color::Black).len(), 20);

        let king = position.king(Color::White).unwrap();
        assert_eq!((king.kind, king.square), (PieceKind::King, sq("e1")));
        assert_eq!(position.roster(Color::White)[4].unwrap().id(), king.id());
        assert_eq!(position.roster(Color::Black)[8].unwrap().square, sq("a7"));
        assert_eq!(position.get_piece(sq("d8")).unwrap().kind, PieceKind::Queen);
        assert_eq!(Square::new(6, 4), sq("e2"));
    }

    #[test]
    fn test_pawn_moves() {
        let mut position = Position::new();
        assert_eq!(
            position.get_locations(sq("e2")),
            vec![Destination::Square(sq("e3")), Destination::Square(sq("e4"))]
        );

        play(&mut position, "e2", "e4");
        play(&mut position, "d7", "d5");
        // Moved pawns lose the double step and capture diagonally
        assert_eq!(
            position.get_locations(sq("e4")),
            vec![Destination::Square(sq("e5")), Destination::Square(sq("d5"))]
        );
    }

    #[test]
    fn test_legal_destinations_are_tentative_and_safe() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut position = Position::new();

        for _ in 0..60 {
            let color = position.turn();
            let pieces: Vec<Piece> = position.pieces(color).copied().collect();
            for piece in pieces {
                let tentative = piece.tentative_destinations(&position);
                for destination in position.legal_destinations(piece.id()) {
                    if let Destination::Square(target) = destination {
                        assert!(tentative.contains(&target), "{:?} -> {}", piece, target);
                    }
                    let mut trial = position.copy();
                    trial.move_piece(piece.square, destination).unwrap();
                    assert!(!trial.in_check(color), "{:?} -> {} leaves king in check", piece, destination);
                }
            }

            let Some((origin, destination)) = random_move(&mut position, &mut rng) else {
                break;
            };
            let outcome = position.move_piece(origin, destination).unwrap();
            if outcome.promotion_due {
                position.transform_pawn(outcome.to, PieceKind::Queen).unwrap();
            }
            if let TurnOutcome::Finished(_) = position.pass_turn().unwrap() {
                break;
            }
        }
    }

    #[test]
    fn test_copy_is_independent() {
        let mut original = Position::new();
        play(&mut original, "e2", "e4");
        let snapshot = original.copy();

        let mut copy = original.copy();
        play(&mut copy, "d7", "d5");
        copy.move_piece(sq("e4"), Destination::Square(sq("d5"))).unwrap();

        assert_eq!(original, snapshot);
        assert_ne!(original, copy);
        assert!(original.get_piece(sq("d7")).is_some());
        assert!(original.roster(Color::Black)[11].is_some());
        assert!(copy.roster(Color::Black)[11].is_none());
    }

    #[test]
    fn test_get_locations_leaves_position_untouched() {
        let mut position = Position::new();
        play(&mut position, "e2", "e4");
        play(&mut position, "d7", "d5");
        let before = position.copy();
        for index in 0..64 {
            position.get_locations(Square::from_index(index).unwrap());
        }
        assert_eq!(position, before);
    }

    #[test]
    fn test_no_castling_in_opening() {
        let mut position = Position::new();
        for square in ["e1", "a1", "h1", "e8", "a8", "h8"] {
            assert!(castles(&position.get_locations(sq(square))).is_empty());
        }
    }

    #[test]
    fn test_queenside_castling_after_clearing() {
        let mut position = Position::new();
        for square in ["b1", "c1", "d1"] {
            position.remove(sq(square)).unwrap();
        }

        let from_king = castles(&position.get_locations(sq("e1")));
        assert_eq!(from_king, vec![Destination::Castle { partner: sq("a1"), delta: -2 }]);
        let from_rook = castles(&position.get_locations(sq("a1")));
        assert_eq!(from_rook, vec![Destination::Castle { partner: sq("e1"), delta: -2 }]);
        assert!(castles(&position.get_locations(sq("h1"))).is_empty());

        let outcome = position.move_piece(sq("e1"), from_king[0]).unwrap();
        assert!(outcome.castled);
        let king = position.get_piece(sq("c1")).unwrap();
        let rook = position.get_piece(sq("d1")).unwrap();
        assert_eq!((king.kind, king.has_moved), (PieceKind::King, true));
        assert_eq!((rook.kind, rook.has_moved), (PieceKind::Rook, true));
        assert!(position.get_piece(sq("e1")).is_none());
        assert!(position.get_piece(sq("a1")).is_none());
    }

    #[test]
    fn test_kingside_castling_from_the_rook() {
        let mut position = Position::new();
        play(&mut position, "g1", "f3");
        play(&mut position, "a7", "a6");
        play(&mut position, "e2", "e3");
        play(&mut position, "a6", "a5");
        play(&mut position, "f1", "e2");
        play(&mut position, "a5", "a4");

        let castle = Destination::Castle { partner: sq("e1"), delta: 2 };
        assert_eq!(castles(&position.get_locations(sq("h1"))), vec![castle]);
        position.move_piece(sq("h1"), castle).unwrap();
        assert_eq!(position.get_piece(sq("g1")).unwrap().kind, PieceKind::King);
        assert_eq!(position.get_piece(sq("f1")).unwrap().kind, PieceKind::Rook);
        assert_eq!(position.king(Color::White).unwrap().square, sq("g1"));
    }

    #[test]
    fn test_castling_through_attacked_square() {
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("e1")).unwrap();
        position.place(Color::White, PieceKind::Rook, sq("a1")).unwrap();
        position.place(Color::White, PieceKind::Rook, sq("h1")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("e8")).unwrap();
        let rook = position.place(Color::Black, PieceKind::Rook, sq("f8")).unwrap();

        // f1 is covered, so only the queenside remains
        assert_eq!(
            castles(&position.get_locations(sq("e1"))),
            vec![Destination::Castle { partner: sq("a1"), delta: -2 }]
        );

        // A rook giving check removes both
        position.remove(sq("f8")).unwrap();
        assert!(position.piece(rook).is_none());
        position.place(Color::Black, PieceKind::Rook, sq("e7")).unwrap();
        assert!(position.in_check(Color::White));
        assert!(castles(&position.get_locations(sq("e1"))).is_empty());
    }

    #[test]
    fn test_black_queenside_castling() {
        let mut position = Position::new();
        play(&mut position, "e2", "e4");
        for square in ["b8", "c8", "d8"] {
            position.remove(sq(square)).unwrap();
        }

        let castle = Destination::Castle { partner: sq("a8"), delta: -2 };
        assert_eq!(castles(&position.get_locations(sq("e8"))), vec![castle]);
        let outcome = position.move_piece(sq("e8"), castle).unwrap();
        assert!(outcome.castled);
        assert_eq!(outcome.to, sq("c8"));

        let king = position.get_piece(sq("c8")).unwrap();
        let rook = position.get_piece(sq("d8")).unwrap();
        assert_eq!((king.kind, king.color), (PieceKind::King, Color::Black));
        assert_eq!((rook.kind, rook.color), (PieceKind::Rook, Color::Black));
        assert!(position.get_piece(sq("a8")).is_none());
        assert_eq!(position.pass_turn(), Ok(TurnOutcome::Continue(Color::White)));
    }

    #[test]
    fn test_no_castling_away_from_home_squares() {
        let mut position = Position::empty(Color::White);
        let king = position.place(Color::White, PieceKind::King, sq("e4")).unwrap();
        let rook = position.place(Color::White, PieceKind::Rook, sq("h4")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("a8")).unwrap();

        assert!(position.piece(king).unwrap().has_moved);
        assert!(position.piece(rook).unwrap().has_moved);
        assert!(castles(&position.get_locations(sq("e4"))).is_empty());
        assert!(castles(&position.get_locations(sq("h4"))).is_empty());

        // The opponent's back rank is not home either
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("e8")).unwrap();
        position.place(Color::White, PieceKind::Rook, sq("h8")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("a5")).unwrap();
        assert!(castles(&position.get_locations(sq("e8"))).is_empty());

        // Home squares keep their rights
        let mut position = Position::empty(Color::Black);
        let king = position.place(Color::Black, PieceKind::King, sq("e8")).unwrap();
        let rook = position.place(Color::Black, PieceKind::Rook, sq("a8")).unwrap();
        position.place(Color::White, PieceKind::King, sq("e1")).unwrap();
        assert!(!position.piece(king).unwrap().has_moved);
        assert!(!position.piece(rook).unwrap().has_moved);
        assert_eq!(
            castles(&position.get_locations(sq("e8"))),
            vec![Destination::Castle { partner: sq("a8"), delta: -2 }]
        );
    }

    #[test]
    fn test_capture_updates_roster_and_tally() {
        let mut position = Position::new();
        let observer = RecordingObserver::default();
        position.attach_observer(Box::new(observer.clone()));

        play(&mut position, "e2", "e4");
        play(&mut position, "d7", "d5");
        let outcome = position.move_piece(sq("e4"), Destination::Square(sq("d5"))).unwrap();

        let capture = outcome.captured.unwrap();
        assert_eq!((capture.color, capture.kind, capture.tally), (Color::Black, PieceKind::Pawn, 1));
        assert_eq!(position.lost().get(Color::Black, PieceKind::Pawn), 1);
        assert!(position.roster(Color::Black)[11].is_none());
        assert!(position.roster(Color::Black)[12].is_some());
        assert_eq!(position.pieces(Color::Black).count(), 15);
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![Event::Captured(Color::Black, PieceKind::Pawn, 1)]
        );
    }

    #[test]
    fn test_checkmate() {
        let mut position = Position::empty(Color::White);
        position.place(Color::Black, PieceKind::King, sq("a8")).unwrap();
        position.place(Color::White, PieceKind::Queen, sq("b7")).unwrap();
        position.place(Color::White, PieceKind::King, sq("c6")).unwrap();
        let observer = RecordingObserver::default();
        position.attach_observer(Box::new(observer.clone()));

        let outcome = position.pass_turn().unwrap();
        let expected = GameOutcome { reason: EndReason::Checkmate, winner: Some(Color::White) };
        assert_eq!(outcome, TurnOutcome::Finished(expected));
        assert_eq!(position.outcome(), Some(expected));
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![Event::GameOver(EndReason::Checkmate, Some(Color::White))]
        );

        // Nothing moves once the game is decided
        assert_eq!(position.pass_turn(), Err(EngineError::GameOver));
        assert_eq!(
            position.move_piece(sq("a8"), Destination::Square(sq("a7"))),
            Err(EngineError::GameOver)
        );
    }

    #[test]
    fn test_stalemate() {
        let mut position = Position::empty(Color::White);
        position.place(Color::Black, PieceKind::King, sq("a8")).unwrap();
        position.place(Color::White, PieceKind::King, sq("c6")).unwrap();
        position.place(Color::White, PieceKind::Queen, sq("b6")).unwrap();

        let outcome = position.pass_turn().unwrap();
        assert!(!position.in_check(Color::Black));
        assert!(position.all_legal_moves(Color::Black).is_empty());
        assert_eq!(
            outcome,
            TurnOutcome::Finished(GameOutcome { reason: EndReason::Stalemate, winner: None })
        );
    }

    #[test]
    fn test_pinned_piece_and_rejections() {
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("e1")).unwrap();
        position.place(Color::White, PieceKind::Bishop, sq("e2")).unwrap();
        position.place(Color::Black, PieceKind::Rook, sq("e8")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("a8")).unwrap();

        assert!(!position.get_piece(sq("e2")).unwrap().tentative_destinations(&position).is_empty());
        assert!(position.get_locations(sq("e2")).is_empty());
        assert_eq!(
            position.move_piece(sq("e2"), Destination::Square(sq("d3"))),
            Err(EngineError::IllegalMove { from: sq("e2"), to: sq("d3") })
        );
        assert_eq!(
            position.move_piece(sq("a8"), Destination::Square(sq("a7"))),
            Err(EngineError::OutOfTurn { color: Color::Black })
        );
        assert_eq!(
            position.move_piece(sq("c3"), Destination::Square(sq("c4"))),
            Err(EngineError::NoPiece(sq("c3")))
        );
    }

    #[test]
    fn test_kings_are_never_capture_targets() {
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("a1")).unwrap();
        position.place(Color::White, PieceKind::Rook, sq("h2")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("h8")).unwrap();

        let rook = position.get_piece(sq("h2")).unwrap();
        assert!(rook.tentative_destinations(&position).contains(&sq("h8")));
        assert!(!position.get_locations(sq("h2")).contains(&Destination::Square(sq("h8"))));
    }

    #[test]
    fn test_promotion_keeps_roster_slot() {
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("e1")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("h8")).unwrap();
        let pawn = position.place(Color::White, PieceKind::Pawn, sq("b7")).unwrap();

        let outcome = position.move_piece(sq("b7"), Destination::Square(sq("b8"))).unwrap();
        assert!(outcome.promotion_due);
        assert!(position.check_pawn_end(sq("b8")));
        assert_eq!(position.pass_turn(), Err(EngineError::PromotionPending(sq("b8"))));
        assert_eq!(
            position.transform_pawn(sq("b8"), PieceKind::King),
            Err(EngineError::InvalidPromotion(sq("b8")))
        );

        position.transform_pawn(sq("b8"), PieceKind::Queen).unwrap();
        let queen = *position.get_piece(sq("b8")).unwrap();
        assert_eq!((queen.kind, queen.color, queen.has_moved), (PieceKind::Queen, Color::White, true));
        assert_eq!(queen.id(), pawn);
        assert_eq!(position.roster(Color::White)[pawn.slot as usize], Some(queen));
        assert!(!position.check_pawn_end(sq("b8")));
        assert_eq!(position.pass_turn(), Ok(TurnOutcome::Continue(Color::Black)));
    }

    #[test]
    fn test_black_promotion_on_first_rank() {
        let mut position = Position::empty(Color::Black);
        position.place(Color::Black, PieceKind::King, sq("e8")).unwrap();
        position.place(Color::White, PieceKind::King, sq("h1")).unwrap();
        let pawn = position.place(Color::Black, PieceKind::Pawn, sq("b2")).unwrap();
        assert!(!position.check_pawn_end(sq("b2")));

        let outcome = position.move_piece(sq("b2"), Destination::Square(sq("b1"))).unwrap();
        assert!(outcome.promotion_due);
        assert_eq!(sq("b1").row(), 7);
        assert!(position.check_pawn_end(sq("b1")));
        assert_eq!(position.pass_turn(), Err(EngineError::PromotionPending(sq("b1"))));

        position.transform_pawn(sq("b1"), PieceKind::Queen).unwrap();
        let queen = *position.get_piece(sq("b1")).unwrap();
        assert_eq!((queen.kind, queen.color), (PieceKind::Queen, Color::Black));
        assert_eq!(queen.id(), pawn);
        assert_eq!(position.roster(Color::Black)[pawn.slot as usize], Some(queen));
        assert!(position.in_check(Color::White));
        assert_eq!(position.pass_turn(), Ok(TurnOutcome::Continue(Color::White)));
    }

    #[test]
    fn test_placement_rules() {
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("e1")).unwrap();
        assert_eq!(
            position.place(Color::White, PieceKind::King, sq("d1")),
            Err(EngineError::DuplicateKing(Color::White))
        );
        assert_eq!(
            position.place(Color::Black, PieceKind::Rook, sq("e1")),
            Err(EngineError::SquareOccupied(sq("e1")))
        );
        assert_eq!(position.remove(sq("e1")), Err(EngineError::KingRemoval));

        let mut full = Position::new();
        full.remove(sq("a2")).unwrap();
        assert_eq!(
            full.place(Color::White, PieceKind::Queen, sq("a3")),
            Err(EngineError::RosterFull(Color::White))
        );
    }

    #[test]
    fn test_notation_opening_pawn() {
        let mut position = Position::new();
        let interpreted = interpret(&mut position, "W1.e4").unwrap();
        assert_eq!(interpreted.kind, PieceKind::Pawn);
        assert_eq!(interpreted.origin, Square::new(6, 4));
        assert_eq!(interpreted.destination, Destination::Square(Square::new(4, 4)));
        assert_eq!(interpreted.piece, position.roster(Color::White)[12].unwrap().id());
    }

    #[test]
    fn test_notation_knight_capture_with_check() {
        let mut position = Position::empty(Color::Black);
        position.place(Color::White, PieceKind::King, sq("d1")).unwrap();
        position.place(Color::White, PieceKind::Pawn, sq("c3")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("e8")).unwrap();
        position.place(Color::Black, PieceKind::Knight, sq("b5")).unwrap();
        position.place(Color::Black, PieceKind::Knight, sq("h8")).unwrap();

        let interpreted = interpret(&mut position, "B5.Nxc3+").unwrap();
        assert_eq!(interpreted.color, Color::Black);
        assert_eq!(interpreted.move_number, 5);
        assert_eq!(interpreted.origin, sq("b5"));
        assert!(interpreted.capture);
        assert!(interpreted.check);

        let outcome = interpreted.apply(&mut position).unwrap();
        assert_eq!(outcome.captured.map(|c| c.kind), Some(PieceKind::Pawn));
        assert!(position.in_check(Color::White));
    }

    #[test]
    fn test_notation_castling_and_promotion() {
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("e1")).unwrap();
        position.place(Color::White, PieceKind::Rook, sq("h1")).unwrap();
        position.place(Color::White, PieceKind::Pawn, sq("a7")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("e8")).unwrap();

        let castle = interpret(&mut position, "W1.O-O").unwrap();
        assert_eq!(castle.destination, Destination::Castle { partner: sq("h1"), delta: 2 });
        assert_eq!(castle.target(), sq("h1"));
        assert!(matches!(
            interpret(&mut position, "W1.O-O-O"),
            Err(EngineError::IllegalMove { .. })
        ));

        let promotion = interpret(&mut position, "W1.a8=N").unwrap();
        promotion.apply(&mut position).unwrap();
        assert_eq!(position.get_piece(sq("a8")).unwrap().kind, PieceKind::Knight);
    }

    #[test]
    fn test_perft_initial_position() {
        let position = Position::new();
        assert_eq!(perft(&position, 1), 20);
        assert_eq!(perft(&position, 2), 400);
        assert_eq!(perft(&position, 3), 8902);
    }

    // Counts leaf positions reachable in `depth` plies
    fn perft(position: &Position, depth: u32) -> u64 {
        let mut scratch = position.copy();
        let moves = scratch.all_legal_moves(scratch.turn());
        if depth == 1 {
            return moves.len() as u64;
        }

        let mut nodes = 0;
        for (origin, destination) in moves {
            let mut next = position.copy();
            next.move_piece(origin, destination).unwrap();
            next.pass_turn().unwrap();
            nodes += perft(&next, depth - 1);
        }
        nodes
    }

    #[test]
    fn test_search_takes_free_queen() {
        let mut position = Position::empty(Color::White);
        position.place(Color::White, PieceKind::King, sq("a1")).unwrap();
        position.place(Color::White, PieceKind::Rook, sq("d1")).unwrap();
        position.place(Color::Black, PieceKind::Queen, sq("d5")).unwrap();
        position.place(Color::Black, PieceKind::King, sq("h8")).unwrap();

        let mut search = Search::new(SearchConfig::default().with_agent(Color::White).with_depth(1));
        let best = search.find_best_move(&position).unwrap();
        assert_eq!(best.origin, sq("d1"));
        assert_eq!(best.destination, Destination::Square(sq("d5")));
        assert_eq!(best.value, 3.0);
        assert!(search.get_nodes_searched() > 0);
        // The search never touches the live position
        assert!(position.get_piece(sq("d5")).is_some());
    }

    #[test]
    fn test_search_reports_no_legal_moves() {
        let mut position = Position::empty(Color::Black);
        position.place(Color::Black, PieceKind::King, sq("a8")).unwrap();
        position.place(Color::White, PieceKind::King, sq("c6")).unwrap();
        position.place(Color::White, PieceKind::Queen, sq("b6")).unwrap();

        let mut search = Search::new(SearchConfig::default());
        assert_eq!(search.find_best_move(&position), Err(EngineError::NoLegalMoves(Color::Black)));
        assert!(random_move(&mut position, &mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn test_search_cancellation() {
        let position = Position::new();
        let cancel = Arc::new(AtomicBool::new(true));
        let mut search = Search::new(SearchConfig::default().with_agent(Color::White))
            .with_cancel_flag(Arc::clone(&cancel));

        // A pre-cancelled search still finishes its first root branch
        let best = search.find_best_move(&position).unwrap();
        assert_eq!(best.origin, sq("b1"));
        assert_eq!(best.destination, Destination::Square(sq("a3")));
        assert_eq!(search.get_nodes_searched(), 21);

        cancel.store(false, Ordering::Relaxed);
        let handle = Search::spawn(&position, SearchConfig::default().with_agent(Color::White));
        handle.cancel();
        assert!(handle.join().is_ok());
    }
}
