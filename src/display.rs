use anyhow::Result;
use crossterm::{
    style::{style, Attribute, Color, PrintStyledContent, Stylize},
    QueueableCommand,
};

use std::io::{stdout, Write};

use connect_four_solver::player::{GameEnding, Player, Winner, NO_MOVE_SYMBOL};
use connect_four_solver::Board;

fn player_color(player: Player) -> Color {
    match player {
        Player::A => Color::Red,
        Player::B => Color::Yellow,
    }
}

/// Draws the board with coloured tokens, top row first, coordinates below
pub fn print_board(board: &Board) -> Result<()> {
    let mut stdout = stdout();
    let border = format!("+-{}+\n", "--".repeat(board.width()));

    stdout.queue(PrintStyledContent(style(border.clone())))?;
    for y in (0..board.height()).rev() {
        stdout.queue(PrintStyledContent(style("| ")))?;
        for x in 0..board.width() {
            let cell = match board.cell(x, y) {
                Some(player) => style(player.symbol())
                    .attribute(Attribute::Bold)
                    .with(player_color(player)),
                None => style('.').with(Color::DarkBlue),
            };
            stdout
                .queue(PrintStyledContent(cell))?
                .queue(PrintStyledContent(style(' ')))?;
        }
        stdout.queue(PrintStyledContent(style("|\n")))?;
    }
    stdout.queue(PrintStyledContent(style(border)))?;

    let coordinates: Vec<String> = (0..board.width()).map(|x| format!("{:x}", x)).collect();
    stdout.queue(PrintStyledContent(style(format!(
        "| {} |\n",
        coordinates.join(" ")
    ))))?;
    stdout.flush()?;
    Ok(())
}

/// Prints one symbol per column, aligned with the board coordinates
pub fn print_endings(endings: &[Option<Winner>], player: Player) -> Result<()> {
    let mut stdout = stdout();
    stdout.queue(PrintStyledContent(style("| ")))?;
    for ending in endings {
        let symbol = match ending.map(|winner| winner.ending_for(player)) {
            Some(ending @ GameEnding::Win) => style(ending.symbol()).with(Color::Green).bold(),
            Some(ending @ GameEnding::Tie) => style(ending.symbol()).with(Color::Yellow),
            Some(ending @ GameEnding::Lose) => style(ending.symbol()).with(Color::Red),
            None => style(NO_MOVE_SYMBOL).with(Color::DarkGrey),
        };
        stdout
            .queue(PrintStyledContent(symbol))?
            .queue(PrintStyledContent(style(' ')))?;
    }
    stdout.queue(PrintStyledContent(style("|\n")))?;
    stdout.flush()?;
    Ok(())
}
