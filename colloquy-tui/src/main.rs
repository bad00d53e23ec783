//! colloquy - LLM chat client
//!
//! Terminal UI for chatting with hosted language models.

mod app;
mod ui;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use colloquy_core::{ChatService, Config, ConversationStore, Database, LocalIdentityProvider};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::app::App;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    // Log to file; stdout belongs to the TUI
    let _log_guard =
        colloquy_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("colloquy TUI starting up");

    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    let db = Arc::new(db);

    let provider = Arc::new(LocalIdentityProvider::new(Arc::clone(&db)));
    let store = ConversationStore::new(db);
    let chat = ChatService::from_config(&config, store.clone())
        .context("failed to set up chat service")?;

    let mut app = App::new(provider, store, chat);
    if config.completion.probe_on_start {
        app.spawn_probe();
    }

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    tracing::info!("colloquy TUI shutting down");

    result
}

/// Run the main application loop.
///
/// Network work runs on the tokio worker threads; this loop only draws
/// and applies finished results.
fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.update();

        terminal.draw(|frame| ui::render(frame, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
