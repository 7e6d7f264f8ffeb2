//! An exhaustive solver for the board game 'Connect 4' and its variants
//!
//! Any board up to 16 columns wide and 63 rows tall, with any streak
//! length needed to win, is searched to the end of the game. The solver
//! reports for every column whether the player to move wins, ties or
//! loses by throwing there, assuming perfect play from both sides.
//!
//! # Basic Usage
//!
//! ```
//! use connect_four_solver::{board::Board, player::Winner, solver::{EndingsSolver, MoveSolver}};
//!
//!# use std::error::Error;
//!# fn main() -> Result<(), Box<dyn Error>> {
//! let board = Board::new(3, 3, 3)?;
//! let mut solver = MoveSolver::new(&board);
//! let endings = solver.moves_endings(&board).ok_or("interrupted")?;
//!
//! assert_eq!(endings, vec![Some(Winner::Tie); 3]);
//!# Ok(())
//!# }
//! ```

use static_assertions::*;
pub use anyhow;

pub mod player;

pub mod board;

pub mod referee;

pub mod ending_cache;

pub mod interrupt;

pub mod progress;

pub mod solver;

pub mod persistence;

mod test;

pub use board::Board;
pub use ending_cache::EndingCache;
pub use player::{GameEnding, Player, Winner};
pub use solver::{create_solver, EndingsSolver, MoveSolver, ParallelSolver, SolverConfig};

/// The widest supported board, in columns
pub const MAX_WIDTH: usize = 16;

/// The tallest supported board, in rows
pub const MAX_HEIGHT: usize = 63;

pub const DEFAULT_WIDTH: usize = 7;
pub const DEFAULT_HEIGHT: usize = 6;
pub const DEFAULT_WIN_STREAK: usize = 4;

// a column and its height marker must fit in a u64
const_assert!(MAX_HEIGHT < 64);
// row signatures are indexed by a word of `width` bits, coordinates fit in a u8
const_assert!(MAX_WIDTH <= 16);
const_assert!(DEFAULT_WIDTH <= MAX_WIDTH && DEFAULT_HEIGHT <= MAX_HEIGHT);
