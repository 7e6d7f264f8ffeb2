use anyhow::{anyhow, bail, Result};

use std::fmt;

use crate::player::Player;
use crate::{DEFAULT_HEIGHT, DEFAULT_WIDTH, DEFAULT_WIN_STREAK, MAX_HEIGHT, MAX_WIDTH};

/// A column-major game board
///
/// Every column is a single word: bits below the stack height hold the
/// token colours (0 for player A, 1 for player B) and the lowest bit above
/// the stack is a one marking its height. An empty column is therefore `1`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Board {
    width: usize,
    height: usize,
    win_streak: usize,
    state: [u64; MAX_WIDTH],
}

impl Board {
    /// Creates an empty board of the given shape
    pub fn new(width: usize, height: usize, win_streak: usize) -> Result<Self> {
        if width == 0 || width > MAX_WIDTH {
            bail!("board width must be between 1 and {}, got {}", MAX_WIDTH, width);
        }
        if height == 0 || height > MAX_HEIGHT {
            bail!("board height must be between 1 and {}, got {}", MAX_HEIGHT, height);
        }
        if win_streak == 0 {
            bail!("win streak must be at least 1");
        }
        if win_streak > width.max(height) {
            bail!(
                "win streak {} does not fit on a {}x{} board",
                win_streak,
                width,
                height
            );
        }
        Ok(Self::empty(width, height, win_streak))
    }

    fn empty(width: usize, height: usize, win_streak: usize) -> Self {
        let mut board = Self {
            width,
            height,
            win_streak,
            state: [0; MAX_WIDTH],
        };
        board.clear();
        board
    }

    /// Replays a sequence of moves, one hexadecimal digit (zero-based column) per move
    pub fn from_moves<S: AsRef<str>>(
        width: usize,
        height: usize,
        win_streak: usize,
        moves: S,
    ) -> Result<Self> {
        let mut board = Self::new(width, height, win_streak)?;
        board.apply_moves(moves)?;
        Ok(board)
    }

    /// Plays the given moves on top of the current position, alternating players
    pub fn apply_moves<S: AsRef<str>>(&mut self, moves: S) -> Result<()> {
        for (index, column_char) in moves.as_ref().chars().enumerate() {
            match column_char.to_digit(16).map(|c| c as usize) {
                Some(column) if column < self.width => {
                    if !self.can_make_move(column) {
                        bail!("invalid move {} at index {}, column is full", column, index);
                    }
                    let player = self.next_player();
                    self.throw(column, player);
                }
                Some(column) => bail!(
                    "move {} at index {} is out of range 0..{}",
                    column,
                    index,
                    self.width
                ),
                None => bail!(
                    "could not parse '{}' at index {} as a valid move",
                    column_char,
                    index
                ),
            }
        }
        Ok(())
    }

    /// Parses a textual grid, rows top to bottom, `.` for empty cells and `A`/`B` for tokens
    pub fn parse(text: &str, win_streak: usize) -> Result<Self> {
        // bottom row first
        let rows: Vec<Vec<char>> = text
            .trim()
            .lines()
            .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect())
            .rev()
            .collect();
        let height = rows.len();
        let width = rows.first().map_or(0, |row| row.len());
        let mut board = Self::new(width, height, win_streak)?;

        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                bail!(
                    "row {} has {} cells, expected {}",
                    height - y,
                    row.len(),
                    width
                );
            }
            for (x, &cell) in row.iter().enumerate() {
                let player = match cell {
                    'A' => Player::A,
                    'B' => Player::B,
                    '.' => continue,
                    other => return Err(anyhow!("unknown cell '{}' at column {}", other, x)),
                };
                if board.stack_size(x) != y {
                    bail!("token at column {} row {} is floating above an empty cell", x, y);
                }
                board.throw(x, player);
            }
        }
        Ok(board)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn win_streak(&self) -> usize {
        self.win_streak
    }

    /// Number of cells on the board, ie. the maximum game length
    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// The raw column words of the board
    pub fn state(&self) -> &[u64] {
        &self.state[..self.width]
    }

    #[inline]
    pub fn column_state(&self, x: usize) -> u64 {
        self.state[x]
    }

    /// Number of tokens in a column, the position of its height marker
    #[inline]
    pub fn stack_size(&self, x: usize) -> usize {
        stack_size(self.state[x])
    }

    /// Token at the given cell, axes oriented right and up
    #[inline]
    pub fn cell(&self, x: usize, y: usize) -> Option<Player> {
        if y >= self.stack_size(x) {
            return None;
        }
        Some(Player::from_bit(self.state[x] >> y))
    }

    /// Drops a token into column `x`, returning the row it landed on
    ///
    /// The column must not be full, check with [`Board::can_make_move`] first.
    #[inline]
    pub fn throw(&mut self, x: usize, player: Player) -> usize {
        debug_assert!(self.can_make_move(x), "column {} is full", x);
        let y = self.stack_size(x);
        // the old height marker becomes the token, it is already set for player B
        if player == Player::A {
            self.state[x] &= !(1 << y);
        }
        self.state[x] |= 1 << (y + 1);
        y
    }

    /// Takes back the token most recently thrown into column `x` at row `y`
    #[inline]
    pub fn revert(&mut self, x: usize, y: usize) {
        debug_assert_eq!(self.stack_size(x), y + 1, "revert out of order in column {}", x);
        self.state[x] = (self.state[x] & !(1 << (y + 1))) | (1 << y);
    }

    #[inline]
    pub fn can_make_move(&self, x: usize) -> bool {
        self.state[x] >> self.height == 0
    }

    pub fn is_full(&self) -> bool {
        (0..self.width).all(|x| !self.can_make_move(x))
    }

    /// Determines whose turn it is by counting the tokens of each colour
    pub fn next_player(&self) -> Player {
        let mut tokens_a = 0;
        let mut tokens_b = 0;
        for x in 0..self.width {
            let size = self.stack_size(x);
            let column_b = (self.state[x] & ((1 << size) - 1)).count_ones() as usize;
            tokens_b += column_b;
            tokens_a += size - column_b;
        }
        if tokens_a > tokens_b {
            Player::B
        } else {
            Player::A
        }
    }

    /// Total number of tokens on the board
    pub fn count_moves(&self) -> usize {
        (0..self.width).map(|x| self.stack_size(x)).sum()
    }

    pub fn clear(&mut self) {
        for column in self.state.iter_mut().take(self.width) {
            *column = 1;
        }
    }

    /// The board reflected left to right
    pub fn mirrored(&self) -> Self {
        let mut mirror = *self;
        for x in 0..self.width {
            mirror.state[x] = self.state[self.width - 1 - x];
        }
        mirror
    }
}

/// Stack size of a raw column word, 0 for the invalid word `0`
#[inline]
pub fn stack_size(column_state: u64) -> usize {
    match column_state {
        0 => 0,
        state => 63 - state.leading_zeros() as usize,
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::empty(DEFAULT_WIDTH, DEFAULT_HEIGHT, DEFAULT_WIN_STREAK)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let border = format!("+-{}+", "--".repeat(self.width));

        writeln!(f, "{}", border)?;
        for y in (0..self.height).rev() {
            let cells: Vec<String> = (0..self.width)
                .map(|x| match self.cell(x, y) {
                    Some(player) => player.symbol().to_string(),
                    None => ".".to_string(),
                })
                .collect();
            writeln!(f, "| {} |", cells.join(" "))?;
        }
        writeln!(f, "{}", border)?;

        let coordinates: Vec<String> = (0..self.width).map(|x| format!("{:x}", x)).collect();
        write!(f, "| {} |", coordinates.join(" "))
    }
}
