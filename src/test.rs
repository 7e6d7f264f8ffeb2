#[cfg(test)]
pub mod test {
    use anyhow::{anyhow, Result};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use std::collections::HashSet;
    use std::fs;
    use std::thread;
    use std::time::Duration;

    use crate::ending_cache::{fingerprint, EndingCache, CACHE_SIZE_LIMIT};
    use crate::interrupt::{Interrupt, Interrupted};
    use crate::persistence::{persisted_depths, CacheStore};
    use crate::player::{endings_line, Player, Winner};
    use crate::referee::{column_winner, Referee};
    use crate::solver::{
        create_solver, move_order, EndingsSolver, MoveSolver, ParallelSolver, SolverConfig,
    };
    use crate::Board;

    const A: Winner = Winner::Player(Player::A);
    const B: Winner = Winner::Player(Player::B);
    const TIE: Winner = Winner::Tie;

    // reports and interrupt checks on every iteration
    fn eager_config() -> SolverConfig {
        SolverConfig {
            report_mask: 0,
            report_period: Duration::ZERO,
            ..SolverConfig::default()
        }
    }

    fn solve(board: &Board) -> Result<Vec<Option<Winner>>> {
        MoveSolver::new(board)
            .moves_endings(board)
            .ok_or_else(|| anyhow!("unexpected interrupt"))
    }

    // plays random legal moves until someone wins or the board is full
    fn random_game(rng: &mut StdRng, board: &mut Board, referee: &Referee) -> Option<Player> {
        while !board.is_full() {
            let x = rng.random_range(0..board.width());
            if !board.can_make_move(x) {
                continue;
            }
            let player = board.next_player();
            let y = board.throw(x, player);
            let won = referee.has_player_won(board, x, y, player);
            assert_eq!(won, referee.has_winner(board) == Some(player), "\n{}", board);
            if won {
                return Some(player);
            }
        }
        None
    }

    #[test]
    pub fn empty_board_render() -> Result<()> {
        let board = Board::new(7, 6, 4)?;
        assert_eq!(board.stack_size(0), 0);
        assert_eq!(board.cell(0, 0), None);
        assert_eq!(
            board.to_string(),
            "+---------------+
| . . . . . . . |
| . . . . . . . |
| . . . . . . . |
| . . . . . . . |
| . . . . . . . |
| . . . . . . . |
+---------------+
| 0 1 2 3 4 5 6 |"
        );
        Ok(())
    }

    #[test]
    pub fn render_tokens() -> Result<()> {
        let mut board = Board::new(7, 6, 4)?;
        board.throw(1, Player::A);
        board.throw(1, Player::B);
        board.throw(3, Player::A);
        assert_eq!(
            board.to_string(),
            "+---------------+
| . . . . . . . |
| . . . . . . . |
| . . . . . . . |
| . . . . . . . |
| . B . . . . . |
| . A . A . . . |
+---------------+
| 0 1 2 3 4 5 6 |"
        );
        Ok(())
    }

    #[test]
    pub fn parse_board() -> Result<()> {
        let board = Board::parse(
            "
.......
.......
......B
......B
.B....A
.A.A..B
",
            4,
        )?;
        let spaced = Board::parse(
            "
            . . . . . . .
            . . . . . . .
            . . . . . . B
            . . . . . . B
            . B . . . . A
            . A . A . . B
            ",
            4,
        )?;
        assert_eq!(board, spaced);
        assert_eq!((board.width(), board.height()), (7, 6));
        assert_eq!(board.cell(6, 0), Some(Player::B));
        assert_eq!(board.cell(6, 1), Some(Player::A));
        assert_eq!(board.cell(6, 3), Some(Player::B));
        assert_eq!(board.cell(6, 4), None);
        assert_eq!(board.count_moves(), 7);

        // ragged, unknown token, floating token
        assert!(Board::parse("...\n..", 2).is_err());
        assert!(Board::parse("..\nAX", 2).is_err());
        assert!(Board::parse("A.\n..", 2).is_err());
        Ok(())
    }

    #[test]
    pub fn next_player() -> Result<()> {
        let board = Board::parse(
            "
            . . . . . . .
            . . . . . . .
            . . . . . . B
            . . . A . . B
            . B . A . . A
            . A . A . . B
            ",
            4,
        )?;
        assert_eq!(board.next_player(), Player::B);
        assert_eq!(Board::new(7, 6, 4)?.next_player(), Player::A);
        Ok(())
    }

    #[test]
    pub fn moves_from_hex() -> Result<()> {
        let board = Board::from_moves(7, 6, 4, "0016")?;
        assert_eq!(board.cell(0, 0), Some(Player::A));
        assert_eq!(board.cell(0, 1), Some(Player::B));
        assert_eq!(board.cell(1, 0), Some(Player::A));
        assert_eq!(board.cell(6, 0), Some(Player::B));

        let wide = Board::from_moves(12, 3, 4, "ab")?;
        assert_eq!(wide.cell(10, 0), Some(Player::A));
        assert_eq!(wide.cell(11, 0), Some(Player::B));

        assert!(Board::from_moves(7, 6, 4, "7").is_err());
        assert!(Board::from_moves(7, 6, 4, "z").is_err());
        assert!(Board::from_moves(7, 6, 4, "0000000").is_err());
        assert!(Board::new(17, 6, 4).is_err());
        assert!(Board::new(7, 64, 4).is_err());
        Ok(())
    }

    #[test]
    pub fn win_streak_fits_board() -> Result<()> {
        assert!(Board::new(3, 3, 4).is_err());
        assert!(Board::from_moves(2, 1, 3, "0").is_err());
        assert!(Board::parse("..\n..", 3).is_err());

        // one side long enough is all it takes
        assert!(Board::new(4, 1, 4).is_ok());
        assert!(Board::new(1, 5, 5).is_ok());
        assert!(Board::new(7, 6, 7).is_ok());
        Ok(())
    }

    #[test]
    pub fn throw_and_revert() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut board = Board::new(6, 5, 4)?;

        while !board.is_full() {
            let x = rng.random_range(0..board.width());
            if !board.can_make_move(x) {
                continue;
            }
            let player = board.next_player();
            let before = board;
            let y = board.throw(x, player);
            assert_eq!(y, before.stack_size(x));
            assert_eq!(board.stack_size(x), y + 1);
            assert_eq!(board.cell(x, y), Some(player));

            board.revert(x, y);
            assert_eq!(board, before);
            board.throw(x, player);
        }
        assert_eq!(board.count_moves(), 30);

        board.clear();
        assert_eq!(board, Board::new(6, 5, 4)?);
        Ok(())
    }

    #[test]
    pub fn moves_order() -> Result<()> {
        assert_eq!(move_order(6), vec![3, 2, 4, 1, 5, 0]);
        assert_eq!(move_order(7), vec![3, 4, 2, 5, 1, 6, 0]);
        assert_eq!(move_order(1), vec![0]);
        Ok(())
    }

    #[test]
    pub fn mirrored_positions_share_entries() -> Result<()> {
        let left = Board::parse(
            "
            A . . . .
            A . . B .
            A . B A A
            ",
            4,
        )?;
        let right = Board::parse(
            "
            . . . . A
            . B . . A
            A A B . A
            ",
            4,
        )?;
        assert_eq!(left.mirrored(), right);

        let mut cache = EndingCache::new(5, 3);
        cache.put(&left, 7, A);
        assert_eq!(cache.get(&left, 7), Some(A));
        assert_eq!(cache.get(&right, 7), Some(A));
        assert_eq!(cache.get(&right, 6), None);
        assert_eq!(cache.hits(), 2);
        Ok(())
    }

    #[test]
    pub fn fingerprints() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(11);

        // packed and hashed keys
        for (width, height) in [(7, 6), (16, 10)] {
            let mut board = Board::new(width, height, 4)?;
            let mut seen = HashSet::new();
            for _ in 0..40 {
                let x = rng.random_range(0..width);
                if !board.can_make_move(x) {
                    continue;
                }
                board.throw(x, board.next_player());
                assert_eq!(fingerprint(&board), fingerprint(&board.mirrored()));
                if board != board.mirrored() {
                    seen.insert(fingerprint(&board));
                }
            }
            assert!(seen.len() > 1);
        }

        let one = Board::from_moves(7, 6, 4, "0")?;
        let two = Board::from_moves(7, 6, 4, "1")?;
        assert_ne!(fingerprint(&one), fingerprint(&two));
        Ok(())
    }

    #[test]
    pub fn nobody_won() -> Result<()> {
        let board = Board::new(7, 6, 4)?;
        assert_eq!(Referee::new(&board).has_winner(&board), None);

        let board = Board::parse(
            "
            . . . . . . .
            . . . . . . .
            . . . . . . B
            . A . . . . B
            . B . B A . A
            . A . A B . B
            ",
            4,
        )?;
        assert_eq!(Referee::new(&board).has_winner(&board), None);
        Ok(())
    }

    #[test]
    pub fn won_lines() -> Result<()> {
        let vertical = Board::parse(
            "
            . . . . . . .
            . . . . . . .
            . . . . . . A
            . . . . . . A
            . B . . . . A
            . A . A . . A
            ",
            4,
        )?;
        let referee = Referee::new(&vertical);
        assert_eq!(referee.has_winner(&vertical), Some(Player::A));
        assert!(referee.has_won_vertical(&vertical, 6, Player::A));

        let horizontal = Board::parse(
            "
            . . . . . . .
            . . . . . . .
            . . . . . . A
            . . . . . . A
            . B . B B B B
            A A . A B B A
            ",
            4,
        )?;
        assert_eq!(referee.has_winner(&horizontal), Some(Player::B));
        assert!(referee.has_won_horizontal(&horizontal, 1, Player::B));
        assert!(!referee.has_won_horizontal(&horizontal, 0, Player::A));

        let diagonal = Board::parse(
            "
            . . . . . . .
            . . . . . . .
            . . . . . . A
            . . . . . A A
            . B . B A B B
            A A . A B B A
            ",
            4,
        )?;
        assert_eq!(referee.has_winner(&diagonal), Some(Player::A));
        assert!(referee.has_player_won(&diagonal, 6, 3, Player::A));

        let anti_diagonal = Board::parse(
            "
            . . . . . . .
            . . . . . . .
            . B . . . . B
            . A B . . A A
            . B A B A B B
            A B A A B B A
            ",
            4,
        )?;
        assert_eq!(referee.has_winner(&anti_diagonal), Some(Player::B));
        assert!(referee.has_won_diagonal(&anti_diagonal, 1, 3, Player::B));
        Ok(())
    }

    #[test]
    pub fn min_streak() -> Result<()> {
        let board = Board::parse(
            "
            ...
            .A.
            AAB
            ",
            2,
        )?;
        assert_eq!(Referee::new(&board).has_winner(&board), Some(Player::A));
        Ok(())
    }

    #[test]
    pub fn column_streaks() -> Result<()> {
        assert_eq!(column_winner(0b1, 4), None);
        assert_eq!(column_winner(0b10000, 4), Some(Player::A));
        assert_eq!(column_winner(0b11111, 4), Some(Player::B));
        // A B B B A, marker on top
        assert_eq!(column_winner(0b101110, 3), Some(Player::B));
        assert_eq!(column_winner(0b101110, 4), None);
        Ok(())
    }

    #[test]
    pub fn referee_agrees_with_full_scan() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        // the last shape is too tall for the column table
        for (width, height, win_streak) in [(7, 6, 4), (5, 4, 3), (9, 7, 5), (4, 20, 4)] {
            let referee = Referee::new(&Board::new(width, height, win_streak)?);
            let mut wins = 0;
            for _ in 0..200 {
                let mut board = Board::new(width, height, win_streak)?;
                if random_game(&mut rng, &mut board, &referee).is_some() {
                    wins += 1;
                }
            }
            assert!(wins > 0);
        }
        Ok(())
    }

    #[test]
    pub fn game_results() -> Result<()> {
        let full = Board::from_moves(2, 1, 2, "01")?;
        assert_eq!(Referee::new(&full).game_result(&full), Some(TIE));

        let won = Board::from_moves(3, 2, 2, "010")?;
        assert_eq!(Referee::new(&won).game_result(&won), Some(A));

        let ongoing = Board::from_moves(7, 6, 4, "3344")?;
        assert_eq!(Referee::new(&ongoing).game_result(&ongoing), None);

        // a streak completed by the last token beats a full board
        let board = Board::parse(
            "
            BAB
            ABA
            AAB
            ",
            3,
        )?;
        assert!(board.is_full());
        assert_eq!(Referee::new(&board).game_result(&board), Some(B));
        Ok(())
    }

    #[test]
    pub fn best_result_simplest() -> Result<()> {
        let mut board = Board::parse(
            "
            ....
            ABAB
            ABAB
            ABAB
            ",
            4,
        )?;
        let before = board;
        let mut solver = MoveSolver::new(&board);

        assert_eq!(solver.best_ending_on_move(&mut board, Player::A, 0), Ok(A));
        assert_eq!(solver.best_ending_on_move(&mut board, Player::A, 1), Ok(B));
        assert_eq!(solver.best_ending_on_move(&mut board, Player::A, 2), Ok(A));
        assert_eq!(solver.best_ending_on_move(&mut board, Player::A, 3), Ok(B));
        assert_eq!(board, before);
        Ok(())
    }

    #[test]
    pub fn best_result_simple_tie() -> Result<()> {
        let mut board = Board::parse(
            "
            ..
            AB
            AB
            AB
            ",
            4,
        )?;
        let mut solver = MoveSolver::new(&board);

        assert_eq!(solver.best_ending_on_move(&mut board, Player::A, 0), Ok(A));
        assert_eq!(solver.best_ending_on_move(&mut board, Player::A, 1), Ok(TIE));
        Ok(())
    }

    #[test]
    pub fn win_on_last_move() -> Result<()> {
        let mut board = Board::parse(
            "
            .BBB
            BBAA
            AABA
            ABAA
            ",
            4,
        )?;
        let mut solver = MoveSolver::new(&board);
        assert_eq!(solver.best_ending_on_move(&mut board, Player::B, 0), Ok(B));
        Ok(())
    }

    #[test]
    pub fn small_boards() -> Result<()> {
        assert_eq!(solve(&Board::new(3, 3, 3)?)?, vec![Some(TIE); 3]);
        assert_eq!(solve(&Board::new(3, 3, 2)?)?, vec![Some(A); 3]);
        assert_eq!(solve(&Board::new(2, 2, 2)?)?, vec![Some(A); 2]);

        let mut board = Board::new(3, 3, 2)?;
        assert_eq!(MoveSolver::new(&board).best_ending_on_move(&mut board, Player::A, 1), Ok(A));
        Ok(())
    }

    #[test]
    pub fn full_columns_have_no_ending() -> Result<()> {
        let board = Board::from_moves(3, 2, 3, "00")?;
        let endings = solve(&board)?;
        assert_eq!(endings[0], None);
        assert!(endings[1].is_some() && endings[2].is_some());
        Ok(())
    }

    #[test]
    pub fn cached_results_count() -> Result<()> {
        let board = Board::new(3, 2, 3)?;
        let mut solver = MoveSolver::new(&board);

        let endings = solver.moves_endings(&board).ok_or_else(|| anyhow!("interrupted"))?;
        assert_eq!(endings, vec![Some(TIE); 3]);
        assert_eq!(solver.cache().max_cached_depth(), 2);
        assert_eq!(solver.cache().depth_size(0), 2);
        assert_eq!(solver.cache().depth_size(1), 5);

        let stats = solver.stats();
        assert_eq!(stats.cache_size, solver.cache().size());
        assert!(stats.iterations > 0);
        Ok(())
    }

    #[test]
    pub fn cache_depth_gating() -> Result<()> {
        let board = Board::from_moves(3, 3, 3, "0")?;
        let mut cache = EndingCache::new(3, 3);
        assert_eq!(cache.max_cached_depth(), 5);

        assert_eq!(cache.put(&board, 6, A), A);
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.get(&board, 6), None);
        assert_eq!(cache.get(&board, 100), None);

        assert_eq!(cache.put(&board, 5, B), B);
        assert_eq!(cache.get(&board, 5), Some(B));
        assert_eq!(cache.size(), 1);

        // no shallow levels at all on tiny boards
        assert_eq!(EndingCache::new(2, 2).max_cached_depth(), 0);
        Ok(())
    }

    #[test]
    pub fn cache_eviction() -> Result<()> {
        let mut cache = EndingCache::with_limit(3, 3, 9);
        assert_eq!(cache.max_depth_size(), 1);
        assert_eq!(cache.max_uncleared_depth(), Some(8));

        cache.put(&Board::from_moves(3, 3, 3, "0")?, 0, A);
        cache.put(&Board::from_moves(3, 3, 3, "1")?, 0, B);
        assert_eq!(cache.depth_size(0), 1);
        assert_eq!(cache.clears(), 1);
        assert_eq!(cache.depth_clears(0), 1);
        assert_eq!(cache.max_uncleared_depth(), None);
        assert_eq!(cache.get(&Board::from_moves(3, 3, 3, "1")?, 0), Some(B));
        assert_eq!(cache.get(&Board::from_moves(3, 3, 3, "0")?, 0), None);

        cache.clear_cache(1);
        assert_eq!(cache.clears(), 2);
        Ok(())
    }

    #[test]
    pub fn shallow_levels_never_flush() -> Result<()> {
        let mut cache = EndingCache::with_limit(3, 3, 9);
        cache.set_unflushed_depth(Some(0));

        cache.put(&Board::from_moves(3, 3, 3, "0")?, 0, A);
        cache.put(&Board::from_moves(3, 3, 3, "1")?, 0, B);
        assert_eq!(cache.depth_size(0), 2);
        assert_eq!(cache.clears(), 0);

        cache.put(&Board::from_moves(3, 3, 3, "00")?, 1, A);
        cache.put(&Board::from_moves(3, 3, 3, "01")?, 1, B);
        assert_eq!(cache.depth_size(1), 1);
        assert_eq!(cache.depth_clears(1), 1);

        // merging into a full exempt level keeps what is there
        let mut other = EndingCache::with_limit(3, 3, 9);
        other.put(&Board::from_moves(3, 3, 3, "01")?, 0, TIE);
        cache.merge(other);
        assert_eq!(cache.depth_size(0), 3);
        assert_eq!(cache.depth_clears(0), 0);
        Ok(())
    }

    #[test]
    pub fn solver_keeps_shallow_levels() -> Result<()> {
        let board = Board::new(4, 3, 3)?;
        let expected = solve(&board)?;
        let tight = SolverConfig {
            cache_limit: 12,
            unflushed_depth: Some(2),
            ..SolverConfig::default()
        };

        let mut solver = MoveSolver::with_config(&board, &tight);
        assert_eq!(solver.cache().max_depth_size(), 1);
        assert_eq!(solver.moves_endings(&board), Some(expected.clone()));
        assert!(solver.cache().clears() > 0);
        for depth in 0..=2 {
            assert_eq!(solver.cache().depth_clears(depth), 0);
        }
        assert!(solver.cache().depth_size(1) > 1);

        // a loaded cache keeps the solver's exemption
        let loaded = EndingCache::with_limit(4, 3, 12);
        let solver = MoveSolver::with_config(&board, &tight).with_cache(loaded);
        assert_eq!(solver.cache().unflushed_depth(), Some(2));

        let mut flushing = MoveSolver::with_config(
            &board,
            &SolverConfig {
                unflushed_depth: None,
                ..tight
            },
        );
        assert_eq!(flushing.moves_endings(&board), Some(expected));
        assert!(flushing.cache().depth_clears(1) > 0);
        Ok(())
    }

    #[test]
    pub fn solved_again_from_cache() -> Result<()> {
        let board = Board::new(4, 3, 3)?;
        let mut solver = MoveSolver::new(&board);

        let first = solver.moves_endings(&board).ok_or_else(|| anyhow!("interrupted"))?;
        let first_iterations = solver.stats().iterations;
        let second = solver.moves_endings(&board).ok_or_else(|| anyhow!("interrupted"))?;

        assert_eq!(first, second);
        assert!(solver.stats().iterations < first_iterations);
        assert_eq!(solver.cached_endings(&board), first);
        Ok(())
    }

    #[test]
    pub fn interrupt_restores_board() -> Result<()> {
        let mut board = Board::from_moves(6, 5, 4, "2")?;
        let before = board;
        let mut solver = MoveSolver::with_config(&board, &eager_config());

        solver.interrupt().trigger();
        assert_eq!(
            solver.best_ending_on_move(&mut board, Player::B, 3),
            Err(Interrupted)
        );
        assert_eq!(board, before);

        // single-move queries leave the request pending
        assert!(solver.interrupt().is_triggered());
        assert_eq!(
            solver.best_ending_on_move(&mut board, Player::B, 0),
            Err(Interrupted)
        );
        assert_eq!(board, before);

        solver.interrupt().reset();
        assert!(!solver.interrupt().is_triggered());
        Ok(())
    }

    #[test]
    pub fn stale_interrupt_is_cleared() -> Result<()> {
        let board = Board::new(3, 3, 3)?;
        let sequential = MoveSolver::with_config(&board, &eager_config());
        let parallel = ParallelSolver::with_config(&board, &eager_config());
        let solvers: [Box<dyn EndingsSolver>; 2] = [Box::new(sequential), Box::new(parallel)];

        for mut solver in solvers {
            solver.interrupt().trigger();
            assert_eq!(solver.moves_endings(&board), Some(vec![Some(TIE); 3]));
            assert!(!solver.interrupt().is_triggered());
            assert!(!solver.interrupt().is_armed());

            solver.interrupt().trigger();
            assert!(solver.retrain(&board, 2));
            assert!(!solver.interrupt().is_triggered());

            // the next search is not affected either
            solver.cache_mut().clear_cache(0);
            assert_eq!(solver.moves_endings(&board), Some(vec![Some(TIE); 3]));
        }
        Ok(())
    }

    #[test]
    pub fn interrupt_arming() -> Result<()> {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        {
            let _armed = interrupt.arm();
            assert!(interrupt.is_armed());
            assert!(!interrupt.is_triggered());
            interrupt.trigger();
            assert!(interrupt.clone().is_triggered());
        }
        assert!(!interrupt.is_armed());
        assert!(interrupt.is_triggered());
        Ok(())
    }

    #[test]
    pub fn interrupt_deep_in_search_restores_board() -> Result<()> {
        let mut board = Board::from_moves(7, 6, 4, "33")?;
        let before = board;
        let config = SolverConfig {
            report_mask: (1 << 10) - 1,
            report_period: Duration::ZERO,
            ..SolverConfig::default()
        };
        let mut solver = MoveSolver::with_config(&board, &config);

        let interrupt = solver.interrupt().clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            interrupt.trigger();
        });
        let player = board.next_player();
        assert_eq!(
            solver.best_ending_on_move(&mut board, player, 2),
            Err(Interrupted)
        );
        handle.join().map_err(|_| anyhow!("interrupt thread panicked"))?;

        assert_eq!(board, before);
        assert_eq!(board.count_moves(), 2);
        assert!(solver.stats().iterations > 1 << 10);
        Ok(())
    }

    #[test]
    pub fn interrupt_from_another_thread() -> Result<()> {
        // far too big to finish before the interrupt arrives
        let board = Board::new(7, 6, 4)?;
        let config = SolverConfig {
            report_mask: (1 << 10) - 1,
            report_period: Duration::ZERO,
            ..SolverConfig::default()
        };

        for parallel in [false, true] {
            let mut solver = create_solver(&board, &SolverConfig { parallel, ..config.clone() });
            let interrupt = solver.interrupt().clone();
            let handle = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                interrupt.trigger();
            });
            assert_eq!(solver.moves_endings(&board), None);
            handle.join().map_err(|_| anyhow!("interrupt thread panicked"))?;
            assert!(solver.stats().iterations > 0);
        }
        Ok(())
    }

    #[test]
    pub fn parallel_matches_sequential() -> Result<()> {
        for (width, height, win_streak) in [(3, 3, 3), (4, 3, 3), (5, 3, 3)] {
            let board = Board::new(width, height, win_streak)?;
            let mut parallel = ParallelSolver::new(&board);
            let endings = parallel.moves_endings(&board).ok_or_else(|| anyhow!("interrupted"))?;
            assert_eq!(endings, solve(&board)?);

            // the merged cache answers on its own
            assert_eq!(parallel.cached_endings(&board), endings);
        }
        Ok(())
    }

    #[test]
    pub fn parallel_branches_start_from_known_levels() -> Result<()> {
        let board = Board::new(5, 3, 3)?;
        let mut sequential = MoveSolver::new(&board);
        let expected = sequential.moves_endings(&board).ok_or_else(|| anyhow!("interrupted"))?;

        // only the top level is unknown
        let mut known = sequential.cache().clone();
        known.clear_cache(0);
        assert!(known.depth_size(1) > 0);

        let mut seeded = ParallelSolver::new(&board).with_cache(known);
        assert_eq!(seeded.moves_endings(&board), Some(expected.clone()));
        let mut scratch = ParallelSolver::new(&board);
        assert_eq!(scratch.moves_endings(&board), Some(expected));

        assert!(seeded.stats().iterations < scratch.stats().iterations);
        Ok(())
    }

    #[test]
    pub fn retrain_fills_cache() -> Result<()> {
        let board = Board::new(4, 3, 3)?;
        let expected = solve(&board)?;

        let mut solver = MoveSolver::new(&board);
        assert!(solver.retrain(&board, 2));
        assert_eq!(solver.cached_endings(&board), expected);

        // retraining over an existing cache keeps it consistent
        assert!(solver.retrain(&board, 3));
        assert_eq!(solver.moves_endings(&board), Some(expected));

        // far too big to finish before the interrupt arrives
        let big = Board::new(7, 6, 4)?;
        let config = SolverConfig {
            report_mask: (1 << 10) - 1,
            report_period: Duration::ZERO,
            ..SolverConfig::default()
        };
        let mut interrupted = MoveSolver::with_config(&big, &config);
        let interrupt = interrupted.interrupt().clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            interrupt.trigger();
        });
        assert!(!interrupted.retrain(&big, 4));
        handle.join().map_err(|_| anyhow!("interrupt thread panicked"))?;
        Ok(())
    }

    #[test]
    pub fn cache_persistence() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("c4solver-cache-{}", std::process::id()));
        let store = CacheStore::new(&dir);
        let board = Board::new(4, 3, 3)?;
        let mut solver = MoveSolver::new(&board);
        let expected = solver.moves_endings(&board).ok_or_else(|| anyhow!("interrupted"))?;

        assert!(!store.exists(4, 3));
        let path = store.save(solver.cache())?;
        assert!(store.exists(4, 3));

        let loaded = store.load(4, 3, CACHE_SIZE_LIMIT)?;
        let persisted = persisted_depths(solver.cache());
        assert_eq!(persisted, 5);
        for depth in 0..loaded.depths() {
            if depth < persisted {
                let saved: HashSet<_> = solver.cache().entries(depth).collect();
                let restored: HashSet<_> = loaded.entries(depth).collect();
                assert_eq!(saved, restored);
            } else {
                assert_eq!(loaded.depth_size(depth), 0);
            }
        }

        let mut reloaded = MoveSolver::new(&board).with_cache(loaded);
        assert_eq!(reloaded.moves_endings(&board), Some(expected));
        // every top-level move is answered by the restored shallow levels
        assert_eq!(reloaded.stats().iterations, 4);

        // wrong shape
        fs::copy(&path, store.cache_path(3, 4))?;
        assert!(store.load(3, 4, CACHE_SIZE_LIMIT).is_err());

        // flipped byte
        let mut bytes = fs::read(&path)?;
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x40;
        fs::write(&path, &bytes)?;
        assert!(store.load(4, 3, CACHE_SIZE_LIMIT).is_err());

        // truncated
        fs::write(&path, &bytes[..6])?;
        assert!(store.load(4, 3, CACHE_SIZE_LIMIT).is_err());

        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    pub fn endings_display() -> Result<()> {
        let endings = [Some(A), Some(TIE), None, Some(B)];
        assert_eq!(endings_line(&endings, Player::A), "| W T - L |");
        assert_eq!(endings_line(&endings, Player::B), "| L T - W |");

        for winner in [A, B, TIE] {
            assert_eq!(Winner::from_code(winner.code()), Some(winner));
        }
        assert_eq!(Winner::from_code(3), None);
        Ok(())
    }
}
