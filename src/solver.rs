//! An agent to solve Connect Four family games by exhaustive search

use indicatif::ProgressBar;
use log::{debug, info};
use rayon::prelude::*;

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::board::Board;
use crate::ending_cache::{EndingCache, CACHE_SIZE_LIMIT, UNFLUSHED_DEPTH};
use crate::interrupt::{Interrupt, Interrupted};
use crate::player::{Player, Winner};
use crate::progress::Progress;
use crate::referee::Referee;

/// Iterations between two checks of the report clock, as a mask (every 2^20)
pub const REPORT_PERIOD_MASK: u64 = (1 << 20) - 1;
/// Minimum wall-clock time between two status reports
pub const REPORT_PERIOD: Duration = Duration::from_secs(2);
/// Smallest board, in cells, worth fanning out over threads
pub const PARALLEL_MIN_CELLS: usize = 20;

/// Outcome of every column of a position, `None` for a full column
pub type MovesEndings = Vec<Option<Winner>>;

/// Returns the columns ordered from the middle outwards, as
/// the middle columns tend to settle the game sooner
pub fn move_order(width: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(width);
    // collect from the edges inwards, then reverse
    for i in 0..width {
        let column = if i % 2 == 0 { i / 2 } else { width - 1 - i / 2 };
        order.push(column);
    }
    order.reverse();
    order
}

/// Tuning of a solver, all fields have sensible defaults
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Iteration mask gating the status reports and interrupt checks
    pub report_mask: u64,
    /// Minimum time between two status reports
    pub report_period: Duration,
    /// Draw a progress bar on stderr
    pub progress_bar: bool,
    /// Total number of cache entries across all depths
    pub cache_limit: usize,
    /// Search the top-level moves on separate threads
    pub parallel: bool,
    /// Deepest cache level exempt from flushing
    pub unflushed_depth: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            report_mask: REPORT_PERIOD_MASK,
            report_period: REPORT_PERIOD,
            progress_bar: false,
            cache_limit: CACHE_SIZE_LIMIT,
            parallel: false,
            unflushed_depth: Some(UNFLUSHED_DEPTH),
        }
    }
}

/// Counters describing the work done by a solver (for diagnostics only)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Positions entered by the last top-level search
    pub iterations: u64,
    pub cache_hits: u64,
    pub cache_size: usize,
    pub cache_clears: u64,
}

/// What every solver variant can do, whichever way it searches
pub trait EndingsSolver {
    /// Solves the outcome of each column for the player to move, `None` if interrupted
    fn moves_endings(&mut self, board: &Board) -> Option<MovesEndings>;

    /// Re-derives the cached outcomes of every position shallower than `max_depth`,
    /// returning `false` if interrupted
    fn retrain(&mut self, board: &Board, max_depth: usize) -> bool;

    fn has_player_won(&self, board: &Board, x: usize, y: usize, player: Player) -> bool;

    fn cache(&self) -> &EndingCache;

    fn cache_mut(&mut self) -> &mut EndingCache;

    /// The flag which stops a running search
    fn interrupt(&self) -> &Interrupt;

    fn stats(&self) -> SearchStats;

    /// Outcome of each column as far as the cache already knows it
    fn cached_endings(&mut self, board: &Board) -> MovesEndings {
        let player = board.next_player();
        let depth = board.count_moves();
        let mut board = *board;
        let mut endings = vec![None; board.width()];
        for (x, ending) in endings.iter_mut().enumerate() {
            if board.can_make_move(x) {
                let thrown = Thrown::new(&mut board, x, player);
                *ending = self.cache_mut().get(&thrown, depth);
            }
        }
        endings
    }
}

/// Picks the solver variant suited to a board shape
pub fn create_solver(board: &Board, config: &SolverConfig) -> Box<dyn EndingsSolver> {
    if config.parallel && board.cells() >= PARALLEL_MIN_CELLS {
        Box::new(ParallelSolver::with_config(board, config))
    } else {
        Box::new(MoveSolver::with_config(board, config))
    }
}

/// A token thrown into a board, taken back when the guard is dropped
///
/// Every exit from a search frame, including an `Interrupted` error
/// propagated with `?`, restores the column this way.
struct Thrown<'a> {
    board: &'a mut Board,
    x: usize,
    y: usize,
}

impl<'a> Thrown<'a> {
    #[inline]
    fn new(board: &'a mut Board, x: usize, player: Player) -> Self {
        let y = board.throw(x, player);
        Self { board, x, y }
    }
}

impl Deref for Thrown<'_> {
    type Target = Board;

    fn deref(&self) -> &Board {
        self.board
    }
}

impl DerefMut for Thrown<'_> {
    fn deref_mut(&mut self) -> &mut Board {
        self.board
    }
}

impl Drop for Thrown<'_> {
    #[inline]
    fn drop(&mut self) {
        self.board.revert(self.x, self.y);
    }
}

// fraction of the whole tree covered by a subtree, for progress reports
#[derive(Copy, Clone, Debug)]
struct Span {
    start: f64,
    end: f64,
}

impl Span {
    const FULL: Span = Span { start: 0.0, end: 1.0 };

    #[inline]
    fn part(self, index: usize, parts: usize) -> Self {
        let step = (self.end - self.start) / parts as f64;
        Span {
            start: self.start + index as f64 * step,
            end: self.start + (index + 1) as f64 * step,
        }
    }
}

// the recursive search, borrowing the solver's parts for its duration
struct Search<'a> {
    referee: &'a Referee,
    cache: &'a mut EndingCache,
    order: &'a [usize],
    interrupt: &'a Interrupt,
    progress: &'a mut Progress,
    // depth of the move filling the last empty cell
    tie_depth: usize,
}

impl Search<'_> {
    /// Finds the winner, with perfect play, after `player` throws into column `x`
    ///
    /// `depth` is the number of tokens on the board before the throw.
    fn best_ending_on_move(
        &mut self,
        board: &mut Board,
        player: Player,
        x: usize,
        depth: usize,
        span: Span,
    ) -> Result<Winner, Interrupted> {
        self.progress.tick();

        let mut board = Thrown::new(board, x, player);
        let y = board.y;

        if depth <= self.cache.max_cached_depth() {
            if let Some(ending) = self.cache.get(&board, depth) {
                return Ok(ending);
            }
        }

        self.poll(&board, span.start)?;

        if self.referee.has_player_won(&board, x, y, player) {
            return Ok(Winner::Player(player));
        }
        // no more moves
        if depth == self.tie_depth {
            return Ok(Winner::Tie);
        }

        // at least one move of the opponent is guaranteed here
        let opponent = player.opponent();
        let order = self.order;
        let mut ties = 0;
        for (index, &column) in order.iter().enumerate() {
            if !board.can_make_move(column) {
                continue;
            }
            let ending = self.best_ending_on_move(
                &mut board,
                opponent,
                column,
                depth + 1,
                span.part(index, order.len()),
            )?;

            // nothing beats winning, the remaining moves cannot change the outcome
            if ending == Winner::Player(opponent) {
                return Ok(self.cache.put(&board, depth, ending));
            }
            if ending == Winner::Tie {
                ties += 1;
            }
        }

        // the opponent favours a tie over losing
        let ending = if ties > 0 {
            Winner::Tie
        } else {
            Winner::Player(player)
        };
        Ok(self.cache.put(&board, depth, ending))
    }

    /// Like [`Search::best_ending_on_move`] but explores every move above `max_depth`,
    /// trusting neither the cache nor the short-circuit there
    fn retrain_ending_on_move(
        &mut self,
        board: &mut Board,
        player: Player,
        x: usize,
        depth: usize,
        max_depth: usize,
        span: Span,
    ) -> Result<Winner, Interrupted> {
        self.progress.tick();

        let mut board = Thrown::new(board, x, player);
        let y = board.y;

        if depth >= max_depth && depth <= self.cache.max_cached_depth() {
            if let Some(ending) = self.cache.get(&board, depth) {
                return Ok(ending);
            }
        }

        self.poll(&board, span.start)?;

        if self.referee.has_player_won(&board, x, y, player) {
            return Ok(Winner::Player(player));
        }
        if depth == self.tie_depth {
            return Ok(Winner::Tie);
        }

        let opponent = player.opponent();
        let order = self.order;
        let mut wins = 0;
        let mut ties = 0;
        for (index, &column) in order.iter().enumerate() {
            if !board.can_make_move(column) {
                continue;
            }
            let part = span.part(index, order.len());
            let ending = if depth + 1 < max_depth {
                self.retrain_ending_on_move(&mut board, opponent, column, depth + 1, max_depth, part)?
            } else {
                self.best_ending_on_move(&mut board, opponent, column, depth + 1, part)?
            };

            match ending {
                Winner::Player(winner) if winner == opponent => wins += 1,
                Winner::Tie => ties += 1,
                Winner::Player(_) => {}
            }
        }

        let ending = if wins > 0 {
            Winner::Player(opponent)
        } else if ties > 0 {
            Winner::Tie
        } else {
            Winner::Player(player)
        };
        Ok(self.cache.put(&board, depth, ending))
    }

    #[inline]
    fn poll(&mut self, board: &Board, progress: f64) -> Result<(), Interrupted> {
        if self.progress.is_due() {
            self.progress.report(board, progress, self.cache);
            if self.interrupt.is_triggered() {
                return Err(Interrupted);
            }
        }
        Ok(())
    }
}

/// A single-threaded exhaustive solver
///
/// # Notes
/// Plain minimax over the ternary outcome Win/Tie/Lose. The only cutoff is
/// taken when a reply wins for the player making it, as no sibling can do
/// better than that. Positions up to [`EndingCache::max_cached_depth`] are
/// memoized under a mirror-symmetric key.
pub struct MoveSolver {
    referee: Referee,
    cache: EndingCache,
    order: Vec<usize>,
    interrupt: Interrupt,
    progress: Progress,
    tie_depth: usize,
}

impl MoveSolver {
    /// Creates a new `MoveSolver` for boards shaped like the given one
    pub fn new(board: &Board) -> Self {
        Self::with_config(board, &SolverConfig::default())
    }

    pub fn with_config(board: &Board, config: &SolverConfig) -> Self {
        let order = move_order(board.width());
        let mut cache = EndingCache::with_limit(board.width(), board.height(), config.cache_limit);
        cache.set_unflushed_depth(config.unflushed_depth);
        debug!(
            "solver configured: board {}x{}, win streak {}, move order {:?}, max cached depth {}, max depth size {}, unflushed depth {:?}",
            board.width(),
            board.height(),
            board.win_streak(),
            order,
            cache.max_cached_depth(),
            cache.max_depth_size(),
            cache.unflushed_depth(),
        );

        Self {
            referee: Referee::new(board),
            cache,
            order,
            interrupt: Interrupt::new(),
            progress: Progress::new(config.report_mask, config.report_period, config.progress_bar),
            tie_depth: board.cells() - 1,
        }
    }

    /// Replaces the cache of an existing `MoveSolver`, eg. with one loaded from disk
    ///
    /// The new cache takes over the flush exemption of the old one.
    pub fn with_cache(mut self, mut cache: EndingCache) -> Self {
        cache.set_unflushed_depth(self.cache.unflushed_depth());
        self.cache = cache;
        self
    }

    pub fn move_order(&self) -> &[usize] {
        &self.order
    }

    /// Finds the winner after `player` throws into column `x` of a caller-owned board
    ///
    /// The board is left exactly as it was, also when interrupted. Unlike
    /// [`EndingsSolver::moves_endings`] a pending interrupt is honoured.
    pub fn best_ending_on_move(
        &mut self,
        board: &mut Board,
        player: Player,
        x: usize,
    ) -> Result<Winner, Interrupted> {
        let depth = board.count_moves();
        self.search()
            .best_ending_on_move(board, player, x, depth, Span::FULL)
    }

    fn search(&mut self) -> Search<'_> {
        Search {
            referee: &self.referee,
            cache: &mut self.cache,
            order: &self.order,
            interrupt: &self.interrupt,
            progress: &mut self.progress,
            tie_depth: self.tie_depth,
        }
    }
}

impl EndingsSolver for MoveSolver {
    fn moves_endings(&mut self, board: &Board) -> Option<MovesEndings> {
        let _armed = self.interrupt.arm();
        self.progress.restart();
        let player = board.next_player();
        let depth = board.count_moves();
        let order = self.order.clone();
        let mut endings = vec![None; board.width()];

        let mut search = self.search();
        for (index, &column) in order.iter().enumerate() {
            if !board.can_make_move(column) {
                continue;
            }
            // each top-level branch works on its own copy
            let mut branch = *board;
            match search.best_ending_on_move(
                &mut branch,
                player,
                column,
                depth,
                Span::FULL.part(index, order.len()),
            ) {
                Ok(ending) => endings[column] = Some(ending),
                Err(Interrupted) => {
                    debug!("interrupted");
                    self.progress.finish();
                    return None;
                }
            }
        }

        self.progress.finish();
        Some(endings)
    }

    fn retrain(&mut self, board: &Board, max_depth: usize) -> bool {
        let _armed = self.interrupt.arm();
        self.progress.restart();
        let player = board.next_player();
        let depth = board.count_moves();
        let order = self.order.clone();

        let mut search = self.search();
        for (index, &column) in order.iter().enumerate() {
            if !board.can_make_move(column) {
                continue;
            }
            let mut branch = *board;
            let span = Span::FULL.part(index, order.len());
            if search
                .retrain_ending_on_move(&mut branch, player, column, depth, max_depth, span)
                .is_err()
            {
                debug!("interrupted");
                self.progress.finish();
                return false;
            }
        }

        self.progress.finish();
        true
    }

    fn has_player_won(&self, board: &Board, x: usize, y: usize, player: Player) -> bool {
        self.referee.has_player_won(board, x, y, player)
    }

    fn cache(&self) -> &EndingCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut EndingCache {
        &mut self.cache
    }

    fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    fn stats(&self) -> SearchStats {
        SearchStats {
            iterations: self.progress.iterations(),
            cache_hits: self.cache.hits(),
            cache_size: self.cache.size(),
            cache_clears: self.cache.clears(),
        }
    }
}

/// A solver exploring the top-level moves on separate threads
///
/// # Notes
/// Each top-level branch gets a copy of the board and a private cache with
/// an equal share of the budget, sharing only the read-only referee and the
/// interrupt flag. A private cache starts out with the shallow levels the
/// solver already knows (those a cache file holds) and is merged back into
/// the solver's own once all branches are done.
pub struct ParallelSolver {
    referee: Referee,
    cache: EndingCache,
    order: Vec<usize>,
    interrupt: Interrupt,
    config: SolverConfig,
    tie_depth: usize,
    iterations: u64,
}

impl ParallelSolver {
    pub fn new(board: &Board) -> Self {
        Self::with_config(
            board,
            &SolverConfig {
                parallel: true,
                ..SolverConfig::default()
            },
        )
    }

    pub fn with_config(board: &Board, config: &SolverConfig) -> Self {
        let order = move_order(board.width());
        let mut cache = EndingCache::with_limit(board.width(), board.height(), config.cache_limit);
        cache.set_unflushed_depth(config.unflushed_depth);
        debug!(
            "parallel solver configured: board {}x{}, win streak {}, {} threads",
            board.width(),
            board.height(),
            board.win_streak(),
            rayon::current_num_threads(),
        );

        Self {
            referee: Referee::new(board),
            cache,
            order,
            interrupt: Interrupt::new(),
            config: config.clone(),
            tie_depth: board.cells() - 1,
            iterations: 0,
        }
    }

    pub fn with_cache(mut self, mut cache: EndingCache) -> Self {
        cache.set_unflushed_depth(self.cache.unflushed_depth());
        self.cache = cache;
        self
    }

    /// Deepest level copied into the private cache of each branch
    fn seeded_depth(&self) -> usize {
        self.cache.max_cached_depth() / 2
    }
}

impl EndingsSolver for ParallelSolver {
    fn moves_endings(&mut self, board: &Board) -> Option<MovesEndings> {
        let _armed = self.interrupt.arm();
        let player = board.next_player();
        let depth = board.count_moves();
        let mut endings = self.cached_endings(board);

        let branches: Vec<usize> = self
            .order
            .iter()
            .copied()
            .filter(|&column| board.can_make_move(column) && endings[column].is_none())
            .collect();
        if branches.is_empty() {
            self.iterations = 0;
            return Some(endings);
        }

        let share = self.config.cache_limit / branches.len();
        let seeded_depth = self.seeded_depth();
        let (referee, shared, order, interrupt, config, tie_depth) = (
            &self.referee,
            &self.cache,
            &self.order[..],
            &self.interrupt,
            &self.config,
            self.tie_depth,
        );
        let bar = if config.progress_bar {
            ProgressBar::new(branches.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<(usize, Result<Winner, Interrupted>, EndingCache, u64)> = branches
            .par_iter()
            .map(|&column| {
                let mut cache = shared.shallow_copy(seeded_depth, share);
                let mut progress = Progress::new(config.report_mask, config.report_period, false);
                let mut branch = *board;
                let result = Search {
                    referee,
                    cache: &mut cache,
                    order,
                    interrupt,
                    progress: &mut progress,
                    tie_depth,
                }
                .best_ending_on_move(&mut branch, player, column, depth, Span::FULL);
                bar.inc(1);
                (column, result, cache, progress.iterations())
            })
            .collect();
        bar.finish_and_clear();

        let mut interrupted = false;
        self.iterations = 0;
        for (column, result, cache, iterations) in results {
            self.iterations += iterations;
            // subtrees solved before an interrupt are still exact
            self.cache.merge(cache);
            match result {
                Ok(ending) => endings[column] = Some(ending),
                Err(Interrupted) => interrupted = true,
            }
        }

        if interrupted {
            debug!("interrupted");
            return None;
        }
        info!(
            "parallel search done: {} branches, {} iterations",
            branches.len(),
            self.iterations
        );
        Some(endings)
    }

    fn retrain(&mut self, board: &Board, max_depth: usize) -> bool {
        let _armed = self.interrupt.arm();
        let mut progress = Progress::new(
            self.config.report_mask,
            self.config.report_period,
            self.config.progress_bar,
        );
        let player = board.next_player();
        let depth = board.count_moves();
        let mut search = Search {
            referee: &self.referee,
            cache: &mut self.cache,
            order: &self.order,
            interrupt: &self.interrupt,
            progress: &mut progress,
            tie_depth: self.tie_depth,
        };

        let mut completed = true;
        for (index, &column) in self.order.iter().enumerate() {
            if !board.can_make_move(column) {
                continue;
            }
            let mut branch = *board;
            let span = Span::FULL.part(index, self.order.len());
            if search
                .retrain_ending_on_move(&mut branch, player, column, depth, max_depth, span)
                .is_err()
            {
                debug!("interrupted");
                completed = false;
                break;
            }
        }

        progress.finish();
        self.iterations = progress.iterations();
        completed
    }

    fn has_player_won(&self, board: &Board, x: usize, y: usize, player: Player) -> bool {
        self.referee.has_player_won(board, x, y, player)
    }

    fn cache(&self) -> &EndingCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut EndingCache {
        &mut self.cache
    }

    fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    fn stats(&self) -> SearchStats {
        SearchStats {
            iterations: self.iterations,
            cache_hits: self.cache.hits(),
            cache_size: self.cache.size(),
            cache_clears: self.cache.clears(),
        }
    }
}
