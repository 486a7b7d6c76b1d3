//! Interactive terminal dashboard.

mod app;
mod input;
mod ui;

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use devdash_core::{Config, Dashboard, DashboardOptions, LocalHost};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use app::App;
use input::Effect;

/// Redraw cadence for toasts and streamed log lines.
const RENDER_INTERVAL: Duration = Duration::from_millis(250);

type Term = Terminal<CrosstermBackend<Stdout>>;

pub async fn run(config: Config) -> Result<()> {
    let host = Arc::new(LocalHost::new(config.interest_patterns.clone()));
    let dashboard = Dashboard::start(host, DashboardOptions::from(&config))?;
    let mut app = App::new(dashboard, &config);

    let mut terminal = setup_terminal()?;
    install_panic_hook();

    let result = event_loop(&mut terminal, &mut app).await;

    if let Some(logs) = app.logs.take() {
        logs.tail.stop().await;
    }
    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(terminal: &mut Term, app: &mut App<LocalHost>) -> Result<()> {
    let mut events = EventStream::new();

    let period = app.dashboard.refresh_interval();
    // Start the first tick one period out; `Dashboard::start` already polled.
    let mut poll_ticker = tokio::time::interval_at(Instant::now() + period, period);
    poll_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut render_ticker = tokio::time::interval(RENDER_INTERVAL);
    render_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        app.dashboard.drain();
        app.update(Instant::now().into_std());
        terminal.draw(|frame| ui::draw(frame, app))?;

        if app.should_quit {
            info!("Quit requested");
            return Ok(());
        }

        tokio::select! {
            _ = poll_ticker.tick() => app.dashboard.tick(),
            _ = render_ticker.tick() => {}
            Some(message) = app.dashboard.recv() => app.dashboard.handle(message),
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    let effect = input::handle_key(app, key);
                    run_effect(app, effect).await;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
        }
    }
}

async fn run_effect(app: &mut App<LocalHost>, effect: Effect) {
    match effect {
        Effect::None => {}
        Effect::Export => match app.dashboard.export().await {
            Ok(path) => app
                .dashboard
                .set_status(format!("Exported to {}", path.display())),
            Err(e) => {
                warn!(error = %e, "Export failed");
                app.dashboard.set_status(format!("Export failed: {}", e));
            }
        },
        Effect::OpenLogs { id, name } => {
            match app.dashboard.host().docker().tail_logs(&id) {
                Ok(tail) => app.open_logs(name, tail),
                Err(e) => {
                    warn!(container = %id, error = %e, "Could not stream logs");
                    app.dashboard.set_status(format!("Could not stream logs: {}", e));
                }
            }
        }
        Effect::OpenDetail { pid } => {
            let detail = app.dashboard.host().system().process_detail(pid).await;
            match detail {
                Ok(detail) => app.open_detail(&detail),
                Err(e) => {
                    warn!(pid, error = %e, "Could not inspect process");
                    app.dashboard
                        .set_status(format!("Could not inspect PID {}: {}", pid, e));
                }
            }
        }
        Effect::CloseLogs => {
            app.mode = app::Mode::Normal;
            if let Some(logs) = app.logs.take() {
                logs.tail.stop().await;
            }
        }
    }
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Leave the alternate screen before the default hook prints the panic.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        default_hook(info);
    }));
}
