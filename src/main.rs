mod app;
mod cli;
mod domain;
mod infra;
mod ui;

use crate::app::{
    AppCommand, AppEvent, LoaderMessage, TimelineEvent, TimelineModel, TimelineOptions,
};
use crate::cli::CliInvocation;
use crate::infra::{
    HttpSessionApi, LogTarget, SessionApi, TimelineConfig, init_logging, load_config,
    resolve_log_dir,
};
use crossterm::event::{
    self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    Event, KeyEventKind,
};
use crossterm::terminal::size as terminal_size;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use crossterm::{ExecutableCommand, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::time::{Duration, Instant};
use thiserror::Error;
use time::UtcOffset;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Upper bound on one input wait, so commits and label sync keep running while idle.
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
enum MainError {
    #[error(transparent)]
    App(#[from] crate::app::AppError),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliRunError),

    #[error(transparent)]
    Config(#[from] crate::infra::ConfigError),
}

fn main() {
    if let Err(error) = run_main() {
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{error}");
        std::process::exit(1);
    }
}

fn run_main() -> Result<(), MainError> {
    let args = std::env::args().collect::<Vec<_>>();
    let invocation = match crate::cli::parse_invocation(&args) {
        Ok(invocation) => invocation,
        Err(error) => {
            let mut err = io::stderr().lock();
            let _ = writeln!(err, "{error}");
            let _ = writeln!(err);
            print_help();
            std::process::exit(2);
        }
    };

    // Must run before any thread is spawned, or the local offset is unavailable.
    let offset = local_display_offset();

    match invocation {
        CliInvocation::PrintHelp => {
            print_help();
            Ok(())
        }
        CliInvocation::PrintVersion => {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliInvocation::Tui { overrides } => {
            let config = load_config(&overrides)?;
            let _guard = start_tui_logging();
            Ok(run_tui(&config, offset)?)
        }
        CliInvocation::Command { overrides, command } => {
            let config = load_config(&overrides)?;
            if let Err(error) = init_logging(LogTarget::Stderr) {
                let _ = writeln!(io::stderr().lock(), "logging disabled: {error}");
            }
            crate::cli::run(command, &config, offset)?;
            Ok(())
        }
    }
}

/// Falls back to UTC when the platform cannot report the local offset safely.
fn local_display_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

fn print_help() {
    let text = format!(
        "{name} - timeline of agent sessions across projects\n\nUSAGE:\n  {name} [--url URL] [--group-by MODE] [--include-deleted]   Start the TUI\n  {name} projects                                          List projects\n  {name} rows [--search TEXT] [--source NAME]... [--json]  Print aggregated rows\n  {name} --help | --version\n\nGLOBAL FLAGS:\n  --url URL          Session service base URL (default: {url})\n  --group-by MODE    project|source (default: project)\n  --include-deleted  Include projects marked deleted\n\nOUTPUT:\n  projects: id<TAB>name<TAB>source<TAB>path\n  rows:     label<TAB>session_count<TAB>latest\n\nENV:\n  SESSIONLINE_URL              Base URL\n  SESSIONLINE_GROUP_BY         project|source\n  SESSIONLINE_CONFIG           Config file path (default: <config dir>/sessionline/config.json)\n  SESSIONLINE_LOG              Log filter (default: info)\n",
        name = env!("CARGO_PKG_NAME"),
        url = crate::infra::DEFAULT_BASE_URL,
    );
    let mut out = io::stdout().lock();
    let _ = write!(out, "{text}");
}

/// The terminal is taken over by the TUI, so a logging failure only disables logging.
fn start_tui_logging() -> Option<WorkerGuard> {
    let result = resolve_log_dir().and_then(|dir| init_logging(LogTarget::File(dir)));
    match result {
        Ok(guard) => guard,
        Err(error) => {
            let _ = writeln!(io::stderr().lock(), "logging disabled: {error}");
            None
        }
    }
}

fn run_tui(config: &TimelineConfig, offset: UtcOffset) -> Result<(), crate::app::AppError> {
    let api: Arc<dyn SessionApi> = Arc::new(HttpSessionApi::new(
        &config.base_url,
        config.request_timeout,
    )?);
    info!(base_url = %config.base_url, group_by = config.group_by.label(), "starting timeline");

    let (loader_tx, loader_rx) = channel::<LoaderMessage>();
    let options = TimelineOptions {
        group_by: config.group_by,
        include_deleted_projects: config.include_deleted,
    };
    let mut model = TimelineModel::new(api, options, loader_tx).with_display_offset(offset);

    let mut terminal = setup_terminal()?;
    if let Ok((width, height)) = terminal_size() {
        model.resize(width, height, Instant::now());
    }
    let result = run(&mut terminal, model, &loader_rx);
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, crate::app::AppError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let _ = stdout.execute(EnableBracketedPaste);
    let _ = stdout.execute(EnableMouseCapture);
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<(), crate::app::AppError> {
    disable_raw_mode()?;
    let _ = execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        DisableMouseCapture
    );
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut model: TimelineModel,
    loader_rx: &Receiver<LoaderMessage>,
) -> Result<(), crate::app::AppError> {
    loop {
        let now = Instant::now();
        while let Ok(message) = loader_rx.try_recv() {
            model.handle_loader_message(message, now);
        }
        model.on_frame(now);
        report_events(&mut model);

        terminal.draw(|frame| ui::render(frame, &model))?;

        let timeout = model
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .map_or(FRAME_INTERVAL, |until| until.min(FRAME_INTERVAL));
        if !event::poll(timeout)? {
            continue;
        }

        let app_event = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Release => continue,
            Event::Key(key) => AppEvent::Key(key),
            Event::Paste(text) => AppEvent::Paste(text),
            Event::Mouse(mouse) => AppEvent::Mouse(mouse),
            Event::Resize(width, height) => AppEvent::Resize(width, height),
            _ => continue,
        };
        let (next, command) = app::update(model, app_event);
        model = next;
        if command == AppCommand::Quit {
            model.dispose();
            report_events(&mut model);
            info!("timeline closed");
            return Ok(());
        }
    }
}

/// The standalone binary has no embedding host, so selections and errors go to the log.
fn report_events(model: &mut TimelineModel) {
    for event in model.drain_events() {
        match event {
            TimelineEvent::ProjectSelected(selection) => info!(
                project_id = %selection.project_id,
                project = %selection.project_name,
                "project selected"
            ),
            TimelineEvent::SessionSelected(point) => info!(
                session_id = %point.session_id,
                project_id = %point.project_id,
                source = %point.source,
                "session selected"
            ),
            TimelineEvent::SourcesDiscovered(sources) => {
                debug!(count = sources.len(), "sources discovered")
            }
            TimelineEvent::Error(error) => warn!("timeline load failed: {error}"),
        }
    }
}
