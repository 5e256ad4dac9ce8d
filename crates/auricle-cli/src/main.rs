//! Auricle CLI: terminal listening-test runner

mod ui;

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use tracing::info;

use auricle::audio::AudioEngine;
use auricle::config::{tuning, SessionConfig};
use auricle::session::{
    EvaluationWorkflow, FileSubmitter, HttpSubmitter, Phase, ProtocolView, SessionCommand,
    Submitter,
};

#[derive(Parser)]
#[command(name = "auricle", about = "Terminal listening-test runner", version)]
struct Cli {
    /// Session configuration (JSON)
    config: PathBuf,

    /// Participant identifier recorded in the submission
    #[arg(long)]
    participant: Option<String>,

    /// POST results to this URL instead of writing a file
    #[arg(long, conflicts_with = "output")]
    submit_url: Option<String>,

    /// Results file (default results.json)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Append structured logs here; stderr is silenced during the session
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Render state; refreshed from the workflow snapshot every tick
struct App {
    snapshot: auricle::session::SessionSnapshot,
    /// Cursor over training items or rating sliders
    selected: usize,
    min_rating: i64,
    max_rating: i64,
    running: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file {
        let file = std::fs::File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("auricle=debug")),
            )
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }

    // Load and validate the config before entering the TUI
    let config = match SessionConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    info!(config = %cli.config.display(), protocol = %config.protocol, "session configured");
    let (min_rating, max_rating) = (config.min_rating_value, config.max_rating_value);

    let submitter: Box<dyn Submitter> = match &cli.submit_url {
        Some(url) => match HttpSubmitter::new(url.clone()) {
            Ok(http) => Box::new(http),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            let path = cli.output.clone().unwrap_or_else(|| "results.json".into());
            Box::new(FileSubmitter::new(path))
        }
    };

    let engine = match AudioEngine::new() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Audio error: {}", e);
            std::process::exit(1);
        }
    };

    let mut workflow = match EvaluationWorkflow::new(
        config,
        cli.participant.clone(),
        engine.command_sender(),
        engine.event_receiver().clone(),
        submitter,
    ) {
        Ok(workflow) => workflow,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let session_events = workflow.event_receiver();

    let mut app = App {
        snapshot: workflow.snapshot(),
        selected: 0,
        min_rating,
        max_rating,
        running: true,
    };

    // Suppress stderr during the TUI; ALSA and friends write diagnostics
    // there and corrupt the ratatui display.
    let saved_stderr = unsafe { libc::dup(2) };
    {
        let devnull = std::fs::File::open("/dev/null")?;
        unsafe { libc::dup2(devnull.as_raw_fd(), 2) };
    }

    terminal::enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(tuning::SESSION_TICK_MS);
    let mut last_tick = Instant::now();

    while app.running {
        terminal.draw(|f| ui::draw(f, &app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(key.code, &mut app, &mut workflow);
                    refresh(&mut app, &workflow);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            workflow.pump();
            // Events are wakeups only; the snapshot below carries the state
            while session_events.try_recv().is_ok() {}
            refresh(&mut app, &workflow);
        }
    }

    // Shut the engine down while still in the alternate screen
    // (rodio prints to stderr when the output stream drops)
    engine.shutdown();

    terminal::disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;

    if saved_stderr >= 0 {
        unsafe {
            libc::dup2(saved_stderr, 2);
            libc::close(saved_stderr);
        }
    }

    Ok(())
}

fn refresh(app: &mut App, workflow: &EvaluationWorkflow) {
    let condition = app.snapshot.condition_index;
    let phase = app.snapshot.phase;
    app.snapshot = workflow.snapshot();
    if app.snapshot.condition_index != condition || app.snapshot.phase != phase {
        app.selected = 0;
    }
}

fn handle_key(code: KeyCode, app: &mut App, workflow: &mut EvaluationWorkflow) {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.running = false;
            return;
        }
        KeyCode::Char(' ') => {
            workflow.handle_command(SessionCommand::Pause);
            return;
        }
        KeyCode::Char('o') => {
            workflow.handle_command(SessionCommand::SetLoop(!app.snapshot.loop_enabled));
            return;
        }
        KeyCode::Enter => {
            let cmd = if app.snapshot.phase == Phase::Introduction {
                SessionCommand::Start
            } else {
                SessionCommand::AdvanceTrial
            };
            workflow.handle_command(cmd);
            return;
        }
        _ => {}
    }
    match app.snapshot.phase {
        Phase::Training => training_key(code, app, workflow),
        Phase::Evaluation => evaluation_key(code, app, workflow),
        _ => {}
    }
}

fn training_key(code: KeyCode, app: &mut App, workflow: &mut EvaluationWorkflow) {
    let items = &app.snapshot.training;
    if items.is_empty() {
        return;
    }
    let last = items.len() - 1;
    match code {
        KeyCode::Up => app.selected = app.selected.saturating_sub(1),
        KeyCode::Down => app.selected = (app.selected + 1).min(last),
        KeyCode::Char('p') => {
            let item = &items[app.selected.min(last)];
            workflow.handle_command(SessionCommand::PlayTraining {
                group: item.group.clone(),
                key: item.key.clone(),
            });
        }
        _ => {}
    }
}

fn evaluation_key(code: KeyCode, app: &mut App, workflow: &mut EvaluationWorkflow) {
    match app.snapshot.protocol.clone() {
        Some(ProtocolView::Rating {
            reference_keys,
            sliders,
        }) => {
            if sliders.is_empty() {
                return;
            }
            let last = sliders.len() - 1;
            match code {
                KeyCode::Left => app.selected = app.selected.saturating_sub(1),
                KeyCode::Right => app.selected = (app.selected + 1).min(last),
                KeyCode::Up | KeyCode::Down | KeyCode::PageUp | KeyCode::PageDown => {
                    let slider = &sliders[app.selected.min(last)];
                    let step = match code {
                        KeyCode::Up => 1,
                        KeyCode::Down => -1,
                        KeyCode::PageUp => 10,
                        _ => -10,
                    };
                    workflow.handle_command(SessionCommand::SetRating {
                        key: slider.key.clone(),
                        value: slider.value + step,
                    });
                }
                KeyCode::Char('p') => {
                    let slider = &sliders[app.selected.min(last)];
                    workflow.handle_command(SessionCommand::PlayCandidate(slider.key.clone()));
                }
                KeyCode::Char('r') => {
                    if let Some(key) = reference_keys.first() {
                        workflow.handle_command(SessionCommand::PlayReference(key.clone()));
                    }
                }
                _ => {}
            }
        }
        Some(ProtocolView::Pairwise(view)) => match code {
            KeyCode::Char('a') => {
                workflow.handle_command(SessionCommand::PlayCandidate(view.candidate_a));
            }
            KeyCode::Char('b') => {
                workflow.handle_command(SessionCommand::PlayCandidate(view.candidate_b));
            }
            KeyCode::Char('1') => {
                workflow.handle_command(SessionCommand::SelectCandidate(view.candidate_a));
            }
            KeyCode::Char('2') => {
                workflow.handle_command(SessionCommand::SelectCandidate(view.candidate_b));
            }
            KeyCode::Char('r') => {
                if let Some(key) = view.reference_keys.first() {
                    workflow.handle_command(SessionCommand::PlayReference(key.clone()));
                }
            }
            _ => {}
        },
        Some(ProtocolView::Segmentation(view)) => match code {
            KeyCode::Char('p') => {
                workflow.handle_command(SessionCommand::PlayCandidate(view.stimulus_key));
            }
            KeyCode::Left | KeyCode::Right => {
                let base = view.marker.unwrap_or(0.5);
                let delta = if code == KeyCode::Left { -0.01 } else { 0.01 };
                workflow.handle_command(SessionCommand::SetMarker(
                    (base + delta).clamp(0.0, 1.0),
                ));
            }
            KeyCode::Char('n') => workflow.handle_command(SessionCommand::ConfirmNoChange),
            KeyCode::Char('v') => workflow.handle_command(SessionCommand::ReviewMarker),
            _ => {}
        },
        None => {}
    }
}
