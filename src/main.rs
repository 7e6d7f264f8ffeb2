use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use std::io::{stdin, stdout, Write};
use std::path::PathBuf;
use std::time::Instant;

use connect_four_solver::persistence::{CacheStore, DEFAULT_CACHE_DIR};
use connect_four_solver::referee::Referee;
use connect_four_solver::solver::move_order;
use connect_four_solver::*;

mod display;
use display::*;

#[derive(Parser, Debug)]
#[command(name = "c4solver", version, about = "Exhaustive solver for Connect Four and its variants")]
struct Cli {
    /// Board width in columns
    #[arg(long, default_value_t = DEFAULT_WIDTH, global = true)]
    width: usize,

    /// Board height in rows
    #[arg(long, default_value_t = DEFAULT_HEIGHT, global = true)]
    height: usize,

    /// Board size, eg. 7x6, overrides --width and --height
    #[arg(long, global = true)]
    size: Option<String>,

    /// Number of tokens in a line needed to win
    #[arg(long = "win", default_value_t = DEFAULT_WIN_STREAK, global = true)]
    win_streak: usize,

    /// Neither load nor save the cache file
    #[arg(long, global = true)]
    no_cache: bool,

    /// Directory holding the cache files
    #[arg(long, default_value = DEFAULT_CACHE_DIR, global = true)]
    cache_dir: PathBuf,

    /// Moves to start with, one hexadecimal column per move, eg. 0016
    #[arg(long, default_value = "", global = true)]
    start_with: String,

    /// Search the top-level moves on all cores
    #[arg(long, global = true)]
    parallel: bool,

    /// Show a progress bar while solving
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve the starting position and save the cache
    Train,
    /// Play a game with hints
    Play {
        /// Hide hints for player A
        #[arg(long)]
        hide_a: bool,
        /// Hide hints for player B
        #[arg(long)]
        hide_b: bool,
        /// Make player A move automatically
        #[arg(long)]
        auto_a: bool,
        /// Make player B move automatically
        #[arg(long)]
        auto_b: bool,
    },
    /// Explore positions and the cache interactively
    Browse {
        /// Retrain the cache up to the given depth, save it and exit
        #[arg(long)]
        retrain: Option<usize>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (width, height) = match &cli.size {
        Some(size) => parse_size(size)?,
        None => (cli.width, cli.height),
    };
    let board = Board::from_moves(width, height, cli.win_streak, &cli.start_with)?;
    let referee = Referee::new(&board);
    if let Some(result) = referee.game_result(&board) {
        warn!("starting position is already decided: {}", describe_result(result));
    }
    let store = (!cli.no_cache).then(|| CacheStore::new(&cli.cache_dir));

    let config = SolverConfig {
        progress_bar: cli.progress,
        parallel: cli.parallel,
        ..SolverConfig::default()
    };
    let mut solver = create_solver(&board, &config);
    solver.interrupt().install_ctrlc()?;

    if let Some(store) = &store {
        if store.exists(width, height) {
            match store.load(width, height, config.cache_limit) {
                Ok(mut cache) => {
                    cache.set_unflushed_depth(config.unflushed_depth);
                    *solver.cache_mut() = cache;
                }
                Err(err) => warn!("ignoring cache file: {:#}", err),
            }
        }
    }

    match cli.command.unwrap_or(Command::Play {
        hide_a: false,
        hide_b: false,
        auto_a: false,
        auto_b: false,
    }) {
        Command::Train => train(board, solver.as_mut(), store.as_ref()),
        Command::Play {
            hide_a,
            hide_b,
            auto_a,
            auto_b,
        } => play(board, solver.as_mut(), &referee, (hide_a, hide_b), (auto_a, auto_b)).map(|_| ()),
        Command::Browse { retrain } => browse(board, solver.as_mut(), store.as_ref(), retrain),
    }
}

fn parse_size(size: &str) -> Result<(usize, usize)> {
    let (width, height) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("board size '{}' is not in the WxH format", size))?;
    Ok((
        width.trim().parse().context("invalid board width")?,
        height.trim().parse().context("invalid board height")?,
    ))
}

fn log_summary(solver: &dyn EndingsSolver, start: Instant) {
    let stats = solver.stats();
    info!(
        "board solved in {:.2?}: iterations={} cache_hits={} cache_size={} cache_clears={}",
        start.elapsed(),
        stats.iterations,
        stats.cache_hits,
        stats.cache_size,
        stats.cache_clears,
    );
}

fn save_cache(solver: &dyn EndingsSolver, store: Option<&CacheStore>) {
    if let Some(store) = store {
        if let Err(err) = store.save(solver.cache()) {
            error!("failed to save cache: {:#}", err);
        }
    }
}

fn train(board: Board, solver: &mut dyn EndingsSolver, store: Option<&CacheStore>) -> Result<()> {
    print_board(&board)?;
    let player = board.next_player();

    let start = Instant::now();
    let endings = solver.moves_endings(&board);
    log_summary(solver, start);

    match endings {
        Some(endings) => {
            for (x, ending) in endings.iter().enumerate() {
                if let Some(winner) = ending {
                    info!("best ending for move {}: {}", x, winner.ending_for(player));
                }
            }
        }
        None => warn!("training interrupted, keeping partial results"),
    }

    save_cache(solver, store);
    solver.cache().show_statistics();
    info!("done in {:.2?}", start.elapsed());
    Ok(())
}

fn describe_result(result: Winner) -> String {
    match result {
        Winner::Player(player) => format!("player {} won", player),
        Winner::Tie => "tie".to_string(),
    }
}

/// Alternates turns until the game is decided or input runs out, returning the result
fn play(
    mut board: Board,
    solver: &mut dyn EndingsSolver,
    referee: &Referee,
    hidden: (bool, bool),
    automatic: (bool, bool),
) -> Result<Option<Winner>> {
    loop {
        if let Some(result) = referee.game_result(&board) {
            print_board(&board)?;
            info!("{} in {} moves", describe_result(result), board.count_moves());
            return Ok(Some(result));
        }

        let player = board.next_player();
        let start = Instant::now();
        let endings = match solver.moves_endings(&board) {
            Some(endings) => endings,
            None => {
                warn!("solving interrupted, showing cached endings only");
                solver.cached_endings(&board)
            }
        };
        log_summary(solver, start);

        print_board(&board)?;
        let by_player = |(a, b): (bool, bool)| match player {
            Player::A => a,
            Player::B => b,
        };
        let show_hints = !by_player(hidden);
        if show_hints {
            print_endings(&endings, player)?;
        }
        let Some(best) = best_move(solver, &mut board, &endings, player) else {
            return Ok(None);
        };

        let x = if by_player(automatic) {
            let ending = endings[best].map(|winner| winner.ending_for(player));
            match ending {
                Some(ending) => println!("Player {} moves: {} ({})", player, best, ending),
                None => println!("Player {} moves: {}", player, best),
            }
            best
        } else {
            match read_move(&board, player, show_hints.then_some(best))? {
                Some(x) => x,
                None => return Ok(None),
            }
        };

        board.throw(x, player);
    }
}

// immediate wins first, then known endings, middle columns breaking ties
fn best_move(
    solver: &dyn EndingsSolver,
    board: &mut Board,
    endings: &[Option<Winner>],
    player: Player,
) -> Option<usize> {
    let mut best: Option<(i32, usize)> = None;
    for x in move_order(board.width()) {
        if !board.can_make_move(x) {
            continue;
        }
        let y = board.throw(x, player);
        let score = if solver.has_player_won(board, x, y, player) {
            100
        } else {
            match endings[x].map(|winner| winner.ending_for(player)) {
                Some(GameEnding::Win) => 10,
                Some(GameEnding::Lose) => -10,
                _ => 0,
            }
        };
        board.revert(x, y);
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, x));
        }
    }
    best.map(|(_, x)| x)
}

fn prompt(text: &str) -> Result<Option<String>> {
    print!("{}", text);
    stdout().flush()?;
    let mut buffer = String::new();
    if stdin().read_line(&mut buffer)? == 0 {
        return Ok(None);
    }
    Ok(Some(buffer.trim().to_string()))
}

fn read_move(board: &Board, player: Player, best: Option<usize>) -> Result<Option<usize>> {
    let hint = best.map_or(String::new(), |x| format!(" (Best: {:x})", x));
    loop {
        let text = format!("Player {} moves [0-{:x}]{}: ", player, board.width() - 1, hint);
        let Some(line) = prompt(&text)? else {
            return Ok(None);
        };
        match usize::from_str_radix(&line, 16) {
            Ok(x) if x >= board.width() => error!("move {} is out of range", line),
            Ok(x) if !board.can_make_move(x) => error!("column {} is already full", x),
            Ok(x) => return Ok(Some(x)),
            Err(err) => error!("invalid move '{}': {}", line, err),
        }
    }
}

/// A line typed at the browse prompt
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum BrowseCommand {
    Help,
    Nothing,
    Move(usize),
    Revert(usize),
    Endings,
    Cache,
    New,
    Clear(usize),
    ClearFrom(usize),
    Retrain(usize),
    Save,
    Quit,
}

const BROWSE_HELP: &str = "Available commands:
  X, mX - move next player at column X, eg. m0
  rX - revert token at column X, eg. r0
  e - evaluate endings
  c - show cache statistics & cached endings for current board
  new - start new game
  clear X - clear cache at given depth
  clear X+ - clear cache from given depth
  retrain X - retrain worst scenarios until given depth
  save - save cache file
  q - quit";

fn parse_number(text: &str) -> Result<usize> {
    let text = text.trim();
    text.parse()
        .with_context(|| format!("invalid number '{}'", text))
}

fn parse_browse_command(line: &str) -> Result<BrowseCommand> {
    let command = match line {
        "h" | "help" => BrowseCommand::Help,
        "" => BrowseCommand::Nothing,
        "q" | "quit" => BrowseCommand::Quit,
        "e" => BrowseCommand::Endings,
        "c" => BrowseCommand::Cache,
        "new" => BrowseCommand::New,
        "save" => BrowseCommand::Save,
        "clear" => BrowseCommand::ClearFrom(0),
        _ => {
            if let Some(rest) = line.strip_prefix("clear") {
                match rest.trim().strip_suffix('+') {
                    Some(depth) => BrowseCommand::ClearFrom(parse_number(depth)?),
                    None => BrowseCommand::Clear(parse_number(rest)?),
                }
            } else if let Some(rest) = line.strip_prefix("retrain") {
                BrowseCommand::Retrain(parse_number(rest)?)
            } else if let Some(rest) = line.strip_prefix('m') {
                BrowseCommand::Move(parse_column(rest)?)
            } else if let Some(rest) = line.strip_prefix('r') {
                BrowseCommand::Revert(parse_column(rest)?)
            } else if line.len() == 1 {
                BrowseCommand::Move(parse_column(line)?)
            } else {
                bail!("unknown command '{}'", line)
            }
        }
    };
    Ok(command)
}

fn parse_column(text: &str) -> Result<usize> {
    let text = text.trim();
    usize::from_str_radix(text, 16).with_context(|| format!("invalid column '{}'", text))
}

fn retrain(board: &Board, solver: &mut dyn EndingsSolver, max_depth: usize) {
    info!("retraining worst scenarios until depth {}", max_depth);
    let start = Instant::now();
    if !solver.retrain(board, max_depth) {
        warn!("retraining interrupted");
    }
    log_summary(solver, start);
}

fn browse(
    mut board: Board,
    solver: &mut dyn EndingsSolver,
    store: Option<&CacheStore>,
    retrain_depth: Option<usize>,
) -> Result<()> {
    if let Some(max_depth) = retrain_depth {
        retrain(&board, solver, max_depth);
        save_cache(solver, store);
        return Ok(());
    }

    loop {
        print_board(&board)?;
        let player = board.next_player();
        println!("Current player: {}, moves: {}", player, board.count_moves());

        let Some(line) = prompt("Enter command (h for help) > ")? else {
            return Ok(());
        };
        let command = match parse_browse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                error!("{:#}", err);
                continue;
            }
        };

        match command {
            BrowseCommand::Help => println!("{}", BROWSE_HELP),
            BrowseCommand::Nothing => {}
            BrowseCommand::Quit => return Ok(()),
            BrowseCommand::Move(x) => {
                if x >= board.width() {
                    error!("move {} is out of range", x);
                } else if !board.can_make_move(x) {
                    error!("column {} is already full", x);
                } else {
                    board.throw(x, player);
                }
            }
            BrowseCommand::Revert(x) => {
                if x >= board.width() {
                    error!("column {} is out of range", x);
                } else if board.stack_size(x) == 0 {
                    error!("column {} is already empty", x);
                } else {
                    board.revert(x, board.stack_size(x) - 1);
                }
            }
            BrowseCommand::New => board.clear(),
            BrowseCommand::Clear(depth) => {
                if depth < solver.cache().depths() {
                    solver.cache_mut().clear_cache(depth);
                } else {
                    error!("depth {} is out of range", depth);
                }
            }
            BrowseCommand::ClearFrom(depth) => {
                for d in depth..solver.cache().depths() {
                    solver.cache_mut().clear_cache(d);
                }
            }
            BrowseCommand::Endings => {
                let start = Instant::now();
                match solver.moves_endings(&board) {
                    Some(endings) => {
                        log_summary(solver, start);
                        print_endings(&endings, player)?;
                    }
                    None => warn!("solving interrupted"),
                }
            }
            BrowseCommand::Cache => {
                solver.cache().show_statistics();
                let cache = solver.cache();
                let sizes: Vec<usize> = (0..cache.depths()).map(|d| cache.depth_size(d)).collect();
                info!(
                    "cache size={} hits={} clears={} depth sizes={:?}",
                    cache.size(),
                    cache.hits(),
                    cache.clears(),
                    sizes
                );
                let endings = solver.cached_endings(&board);
                print_endings(&endings, player)?;
            }
            BrowseCommand::Retrain(max_depth) => retrain(&board, solver, max_depth),
            BrowseCommand::Save => save_cache(solver, store),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn browse_commands() -> Result<()> {
        assert_eq!(parse_browse_command("m3")?, BrowseCommand::Move(3));
        assert_eq!(parse_browse_command("m 3")?, BrowseCommand::Move(3));
        assert_eq!(parse_browse_command("a")?, BrowseCommand::Move(10));
        assert_eq!(parse_browse_command("r0")?, BrowseCommand::Revert(0));
        assert_eq!(parse_browse_command("clear 5")?, BrowseCommand::Clear(5));
        assert_eq!(parse_browse_command("clear 5+")?, BrowseCommand::ClearFrom(5));
        assert_eq!(parse_browse_command("clear")?, BrowseCommand::ClearFrom(0));
        assert_eq!(parse_browse_command("retrain 4")?, BrowseCommand::Retrain(4));
        assert_eq!(parse_browse_command("q")?, BrowseCommand::Quit);
        assert!(parse_browse_command("mx").is_err());
        assert!(parse_browse_command("jump").is_err());
        Ok(())
    }

    #[test]
    fn auto_play_stops_when_decided() -> Result<()> {
        // every column is full from the start
        let board = Board::from_moves(2, 1, 2, "01")?;
        let referee = Referee::new(&board);
        let mut solver = MoveSolver::new(&board);
        let result = play(board, &mut solver, &referee, (true, true), (true, true))?;
        assert_eq!(result, Some(Winner::Tie));

        // won before the board fills up
        let board = Board::from_moves(3, 2, 2, "010")?;
        let referee = Referee::new(&board);
        let mut solver = MoveSolver::new(&board);
        let result = play(board, &mut solver, &referee, (true, true), (true, true))?;
        assert_eq!(result, Some(Winner::Player(Player::A)));

        let board = Board::new(3, 3, 3)?;
        let mut solver = MoveSolver::new(&board);
        let result = play(board, &mut solver, &Referee::new(&board), (true, true), (true, true))?;
        assert_eq!(result, Some(Winner::Tie));
        Ok(())
    }

    #[test]
    fn no_best_move_on_full_board() -> Result<()> {
        let mut board = Board::from_moves(2, 2, 2, "0110")?;
        assert!(board.is_full());
        let solver = MoveSolver::new(&board);
        let endings = vec![None; 2];
        let next = board.next_player();
        assert_eq!(best_move(&solver, &mut board, &endings, next), None);

        let mut board = Board::from_moves(3, 1, 2, "0")?;
        let solver = MoveSolver::new(&board);
        let endings = vec![None, Some(Winner::Tie), Some(Winner::Player(Player::A))];
        assert_eq!(best_move(&solver, &mut board, &endings, Player::B), Some(1));
        Ok(())
    }

    #[test]
    fn board_size() -> Result<()> {
        assert_eq!(parse_size("7x6")?, (7, 6));
        assert_eq!(parse_size("5x4")?, (5, 4));
        assert!(parse_size("7").is_err());
        Ok(())
    }
}
