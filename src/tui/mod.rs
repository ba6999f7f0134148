//! Terminal lifecycle and the cooperative event loop.

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;

pub mod app;
pub mod events;
pub mod ui;

use crate::manager::Manager;
use app::App;
use events::{Event, EventHandler};

/// Run the full-screen UI until the user quits. Stops the whole fleet on the
/// way out.
pub async fn run(manager: Arc<Manager>) -> anyhow::Result<()> {
    // Restore the terminal even when the UI panics, so the error lands on a
    // usable screen.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = execute!(io::stdout(), crossterm::cursor::Show);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let width = terminal.size().map(|s| s.width).unwrap_or(120);
    let mut app = App::new(Arc::clone(&manager), width);
    let events = EventHandler::new();

    let result = run_app(&mut terminal, &mut app, events).await;

    // Quit path: cancel the root scope, show the shutdown box while the
    // fleet tears down, then leave the alternate screen.
    manager.root_token().cancel();
    let _ = terminal.draw(|f| ui::draw(f, &app));
    manager.stop_all().await;

    let cleanup = restore_terminal(&mut terminal);
    match (result, cleanup) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), _) => Err(e),
        (Ok(()), Err(e)) => Err(e.into()),
    }
}

fn restore_terminal<B: ratatui::backend::Backend + std::io::Write>(
    terminal: &mut Terminal<B>,
) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut events: EventHandler,
) -> anyhow::Result<()> {
    // Populate the first frame before any tick elapses
    app.on_tick();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        tokio::select! {
            event = events.next() => {
                match event {
                    Some(Event::Key(key)) => {
                        if !app.handle_key(key) {
                            break;
                        }
                    }
                    Some(Event::Resize(w, h)) => app.on_resize(w, h),
                    Some(Event::Shutdown) | None => {
                        app.quitting = true;
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(app.tick_interval()) => {
                app.on_tick();
            }
        }
    }

    events.shutdown();
    Ok(())
}
