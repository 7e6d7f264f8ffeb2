//! Players and game outcomes

use std::fmt;

/// One of the two players. Player A always moves first.
///
/// The discriminants double as the token bit stored in a column word,
/// so the opponent is a single bit flip.
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Player {
    A = 0,
    B = 1,
}

impl Player {
    #[inline]
    pub fn opponent(self) -> Self {
        Self::from_bit(1 - self as u64)
    }

    /// Converts the lowest bit of a column word into the player owning that token
    #[inline]
    pub fn from_bit(bit: u64) -> Self {
        if bit & 1 == 0 {
            Player::A
        } else {
            Player::B
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Player::A => 'A',
            Player::B => 'B',
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// The raw result of a position: who wins it with perfect play, if anyone
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Winner {
    Player(Player),
    Tie,
}

impl Winner {
    /// Reinterprets the raw winner from the point of view of `player`
    pub fn ending_for(self, player: Player) -> GameEnding {
        match self {
            Winner::Tie => GameEnding::Tie,
            Winner::Player(winner) if winner == player => GameEnding::Win,
            Winner::Player(_) => GameEnding::Lose,
        }
    }

    /// Compact code used by the cache file format
    pub fn code(self) -> u8 {
        match self {
            Winner::Player(Player::A) => 0,
            Winner::Player(Player::B) => 1,
            Winner::Tie => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Winner::Player(Player::A)),
            1 => Some(Winner::Player(Player::B)),
            2 => Some(Winner::Tie),
            _ => None,
        }
    }
}

impl From<Player> for Winner {
    fn from(player: Player) -> Self {
        Winner::Player(player)
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Player(player) => write!(f, "{}", player),
            Winner::Tie => write!(f, "Tie"),
        }
    }
}

/// An outcome seen from one player's perspective
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum GameEnding {
    Win,
    Tie,
    Lose,
}

impl GameEnding {
    pub fn symbol(self) -> char {
        match self {
            GameEnding::Win => 'W',
            GameEnding::Tie => 'T',
            GameEnding::Lose => 'L',
        }
    }
}

impl fmt::Display for GameEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameEnding::Win => "Win",
            GameEnding::Tie => "Tie",
            GameEnding::Lose => "Lose",
        };
        write!(f, "{}", name)
    }
}

/// Symbol shown for a column that cannot be played
pub const NO_MOVE_SYMBOL: char = '-';

/// Renders per-column results from `player`'s perspective, eg. `| W T - L |`
pub fn endings_line(endings: &[Option<Winner>], player: Player) -> String {
    let symbols: Vec<String> = endings
        .iter()
        .map(|ending| match ending {
            Some(winner) => winner.ending_for(player).symbol().to_string(),
            None => NO_MOVE_SYMBOL.to_string(),
        })
        .collect();
    format!("| {} |", symbols.join(" "))
}
