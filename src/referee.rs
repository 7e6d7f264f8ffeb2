//! Win detection for a single move and for whole boards

use crate::board::{stack_size, Board};
use crate::player::{Player, Winner};

/// Tallest board for which every column layout is tabulated
pub const VERTICAL_TABLE_MAX_HEIGHT: usize = 16;

/// Decides whether a move has completed a streak
///
/// Built once per board shape, it holds lookup tables for column layouts
/// and for row signatures, plus the in-bounds cells of every diagonal
/// passing through each coordinate, so the hot path never bounds-checks.
#[derive(Clone, Debug)]
pub struct Referee {
    width: usize,
    height: usize,
    win_streak: usize,

    // winner of every possible column word, `None` for tall boards
    vertical_winners: Option<Vec<Option<Player>>>,
    // does a signature of a player's tokens contain a full streak
    row_wins: Vec<bool>,
    // cells of the `/` and `\` lines through each coordinate, indexed by x * height + y
    diagonals: Vec<Vec<(u8, u8)>>,
    anti_diagonals: Vec<Vec<(u8, u8)>>,
}

impl Referee {
    pub fn new(board: &Board) -> Self {
        let width = board.width();
        let height = board.height();
        let win_streak = board.win_streak();

        let vertical_winners = if height <= VERTICAL_TABLE_MAX_HEIGHT {
            Some(
                (0..1u64 << (height + 1))
                    .map(|column_state| column_winner(column_state, win_streak))
                    .collect(),
            )
        } else {
            None
        };

        // a horizontal row has `width` cells, no diagonal has more
        let row_wins = (0..1u64 << width)
            .map(|row| has_streak(row, win_streak))
            .collect();

        let mut diagonals = Vec::with_capacity(width * height);
        let mut anti_diagonals = Vec::with_capacity(width * height);
        for x in 0..width {
            for y in 0..height {
                diagonals.push(line_through(width, height, win_streak, x, y, 1));
                anti_diagonals.push(line_through(width, height, win_streak, x, y, -1));
            }
        }

        Self {
            width,
            height,
            win_streak,
            vertical_winners,
            row_wins,
            diagonals,
            anti_diagonals,
        }
    }

    /// Has `player` just won by throwing into column `x`, landing on row `y`
    #[inline]
    pub fn has_player_won(&self, board: &Board, x: usize, y: usize, player: Player) -> bool {
        self.has_won_vertical(board, x, player)
            || self.has_won_horizontal(board, y, player)
            || self.has_won_diagonal(board, x, y, player)
    }

    #[inline]
    pub fn has_won_vertical(&self, board: &Board, x: usize, player: Player) -> bool {
        let column_state = board.column_state(x);
        let winner = match &self.vertical_winners {
            Some(table) => table[column_state as usize],
            None => column_winner(column_state, self.win_streak),
        };
        winner == Some(player)
    }

    #[inline]
    pub fn has_won_horizontal(&self, board: &Board, y: usize, player: Player) -> bool {
        let mut row = 0usize;
        for x in 0..self.width {
            if board.cell(x, y) == Some(player) {
                row |= 1 << x;
            }
        }
        self.row_wins[row]
    }

    #[inline]
    pub fn has_won_diagonal(&self, board: &Board, x: usize, y: usize, player: Player) -> bool {
        let index = x * self.height + y;
        self.has_won_line(board, &self.diagonals[index], player)
            || self.has_won_line(board, &self.anti_diagonals[index], player)
    }

    #[inline]
    fn has_won_line(&self, board: &Board, line: &[(u8, u8)], player: Player) -> bool {
        if line.is_empty() {
            return false;
        }
        let mut row = 0usize;
        for (i, &(x, y)) in line.iter().enumerate() {
            if board.cell(x as usize, y as usize) == Some(player) {
                row |= 1 << i;
            }
        }
        self.row_wins[row]
    }

    /// Scans the whole board from scratch for any streak
    ///
    /// Columns are checked first, then rows bottom to top, then diagonals,
    /// and the first streak found wins. Not meant for the search hot path.
    pub fn has_winner(&self, board: &Board) -> Option<Player> {
        if let Some(winner) = (0..board.width())
            .find_map(|x| column_winner(board.column_state(x), board.win_streak()))
        {
            return Some(winner);
        }

        // overlay all columns to find the tallest stack
        let overlay = board.state().iter().fold(0, |acc, column| acc | column);
        for y in 0..stack_size(overlay) {
            let winner = streak_winner(board, (0..board.width()).map(|x| (x, y)));
            if winner.is_some() {
                return winner;
            }
        }

        self.diagonal_starts(board)
            .into_iter()
            .find_map(|(x, y, step)| streak_winner(board, walk(board, x, y, step)))
    }

    /// Tells how the game on this board ended, `None` while it goes on
    pub fn game_result(&self, board: &Board) -> Option<Winner> {
        match self.has_winner(board) {
            Some(player) => Some(Winner::Player(player)),
            None if board.is_full() => Some(Winner::Tie),
            None => None,
        }
    }

    // starting cells of every diagonal long enough to hold a streak
    fn diagonal_starts(&self, board: &Board) -> Vec<(usize, usize, isize)> {
        let (width, height, k) = (board.width(), board.height(), board.win_streak());
        let mut starts = Vec::new();
        if k > width || k > height {
            return starts;
        }
        // bottom edge, towards the top right
        for x in 0..=width - k {
            starts.push((x, 0, 1));
        }
        // bottom edge, towards the top left
        for x in k - 1..width {
            starts.push((x, 0, -1));
        }
        for y in 1..=height - k {
            // left edge, towards the top right
            starts.push((0, y, 1));
            // right edge, towards the top left
            starts.push((width - 1, y, -1));
        }
        starts
    }
}

/// Finds a streak of `win_streak` tokens of one colour within a raw column word
///
/// Runs of ones are isolated by and-ing the word with itself shifted right,
/// `win_streak - 1` times; the occupied range is then masked so the height
/// marker and the bits above it never count.
pub fn column_winner(column_state: u64, win_streak: usize) -> Option<Player> {
    let size = stack_size(column_state);
    if size < win_streak {
        return None;
    }

    let mut ones_b = column_state;
    let mut ones_a = !column_state;
    for _ in 1..win_streak {
        ones_b &= ones_b >> 1;
        ones_a &= ones_a >> 1;
    }

    let mask = (1u64 << (size + 1 - win_streak)) - 1;
    if ones_a & mask != 0 {
        Some(Player::A)
    } else if ones_b & mask != 0 {
        Some(Player::B)
    } else {
        None
    }
}

/// Does a signature (one bit per cell owned by the tested player) contain a streak
pub fn has_streak(row: u64, win_streak: usize) -> bool {
    let mut ones = row;
    for _ in 1..win_streak {
        ones &= ones >> 1;
    }
    ones != 0
}

// in-bounds cells within `win_streak - 1` steps of (x, y) along one diagonal,
// empty if the line is too short to ever hold a streak
fn line_through(
    width: usize,
    height: usize,
    win_streak: usize,
    x: usize,
    y: usize,
    dy: isize,
) -> Vec<(u8, u8)> {
    let reach = win_streak as isize - 1;
    let cells: Vec<(u8, u8)> = (-reach..=reach)
        .map(|i| (x as isize + i, y as isize + i * dy))
        .filter(|&(cx, cy)| cx >= 0 && cx < width as isize && cy >= 0 && cy < height as isize)
        .map(|(cx, cy)| (cx as u8, cy as u8))
        .collect();

    if cells.len() < win_streak {
        Vec::new()
    } else {
        cells
    }
}

// cells from a starting point upwards along a diagonal, until the edge
fn walk(board: &Board, x: usize, y: usize, step: isize) -> impl Iterator<Item = (usize, usize)> {
    let (width, height) = (board.width() as isize, board.height() as isize);
    (0..)
        .map(move |i| (x as isize + i * step, y as isize + i))
        .take_while(move |&(cx, cy)| cx >= 0 && cx < width && cy < height)
        .map(|(cx, cy)| (cx as usize, cy as usize))
}

// counts consecutive equal tokens along a line, resetting on a change of colour or an empty cell
fn streak_winner<I>(board: &Board, cells: I) -> Option<Player>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut last = None;
    let mut streak = 0;
    for (x, y) in cells {
        let current = board.cell(x, y);
        if current.is_none() || current != last {
            streak = 0;
            last = current;
        }
        if current.is_some() {
            streak += 1;
        }
        if streak >= board.win_streak() {
            return current;
        }
    }
    None
}
