use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::DefaultTerminal;
use std::path::PathBuf;
use uuid::Uuid;

use games::darts::{Match, Variant};
use games::{GameState, Validate};
use session::Session;
use throw_log::{JsonlThrowLog, MemoryThrowLog, ThrowLog};
use tui::InteractiveApp;

mod error;
mod games;
mod session;
mod throw_log;
mod tui;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new match. Without a log file the throws are only kept in memory.
    Play {
        #[arg(short, long)]
        log_file: Option<PathBuf>,
        #[arg(short, long, default_value = "501")]
        variant: Variant,
        #[arg(required = true, value_delimiter = ',')]
        players: Vec<String>,
    },
    /// Rebuild a logged match and keep playing it
    Resume {
        #[arg(short, long)]
        log_file: PathBuf,
        match_id: Uuid,
    },
}

fn open_log(log_file: Option<PathBuf>) -> Result<Box<dyn ThrowLog>> {
    match log_file {
        Some(path) => {
            let log = JsonlThrowLog::open(&path).with_context(|| format!("Opening throw log {}", path.display()))?;
            log::info!("Logging throws to {}", log.path().display());
            Ok(Box::new(log))
        }
        None => {
            log::warn!("No log file given, throws will not be kept");
            Ok(Box::new(MemoryThrowLog::new()))
        }
    }
}

fn play(log_file: Option<PathBuf>, variant: Variant, players: &[String]) -> Result<Session> {
    let game = Match::start(variant, players)?;
    game.validate()?;

    Ok(Session::start(game, open_log(log_file)?)?)
}

fn resume(log_file: PathBuf, match_id: Uuid) -> Result<Session> {
    let log = open_log(Some(log_file))?;

    let (started, throws) = log.history(match_id).ok_or_else(|| {
        let known: Vec<String> = log.matches().iter().map(|s| s.match_id.to_string()).collect();
        anyhow!("Match {} not in log, known matches: [{}]", match_id, known.join(", "))
    })?;

    let game = Match::restore(&started, &throws).with_context(|| format!("Replaying match {}", match_id))?;
    game.validate()?;

    Ok(Session::resume(game, log))
}

// Enter submits the typed turn, or re-sends the record that failed to save
fn submit(app: &mut InteractiveApp, session: &mut Session) {
    let outcome = if session.pending().is_some() {
        session.retry()
    } else {
        app.turn().and_then(|turn| session.submit(&turn))
    };

    match outcome {
        Ok(record) => app.record_throw(record, session.game().clone()),
        Err(err) => app.report(&err, session.pending().is_some()),
    }
}

fn event_loop(terminal: &mut DefaultTerminal, session: &mut Session) -> Result<()> {
    let mut app = InteractiveApp::new(session.game().clone());

    loop {
        terminal.draw(|frame| {
            frame.render_widget(app.clone(), frame.area());
        })?;

        let key_event = match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => key_event,
            _ => continue,
        };

        if app.game.is_game_over() {
            match key_event.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Char('n') => match session.restart() {
                    Ok(()) => app = InteractiveApp::new(session.game().clone()),
                    Err(err) => app.report(&err, false),
                },
                _ => {}
            }
            continue;
        }

        match key_event.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Enter => submit(&mut app, session),
            KeyCode::Tab | KeyCode::Down => app.focus_next(),
            KeyCode::BackTab | KeyCode::Up => app.focus_prev(),
            KeyCode::Char(' ') => app.toggle_double(),
            KeyCode::Char(c) if c.is_ascii_digit() => app.push_digit(c),
            KeyCode::Backspace => app.backspace(),
            _ => {}
        }
    }

    Ok(())
}

fn run_interactive(mut session: Session) -> Result<()> {
    color_eyre::install().map_err(|err| anyhow!("Installing error hooks: {}", err))?;
    let mut terminal = ratatui::init();

    let result = event_loop(&mut terminal, &mut session);
    ratatui::restore();

    if let Some(record) = session.pending() {
        log::error!("Turn {} of {} was never saved", record.turn_number, record.player);
    }
    log::info!("{} entries in throw log", session.log().entries().len());

    result
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let session = match args.commands {
        Commands::Play { log_file, variant, players } => play(log_file, variant, &players)?,
        Commands::Resume { log_file, match_id } => resume(log_file, match_id)?,
    };

    run_interactive(session)
}
