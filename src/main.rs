use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;

use longview::app::ViewerState;
use longview::config::Config;
use longview::format::{ApproxMeasure, TextMeasure};
use longview::sources::{ChunkEvent, LogSource, SourceKind, file::FileSource, stdin::StdinSource};
use longview::ui::MINIMAP_WIDTH;
use longview::worker::{EngineEvent, spawn_engine};
use longview::{input, ui};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: longview <file_path>");
        eprintln!("       longview --stdin");
        std::process::exit(1);
    }

    let (source_kind, source): (SourceKind, Box<dyn LogSource>) = if args[1] == "--stdin" {
        (SourceKind::Stdin, Box::new(StdinSource))
    } else {
        let path = PathBuf::from(&args[1]);
        (
            SourceKind::File { path: path.clone() },
            Box::new(FileSource::new(path)),
        )
    };

    // Load config
    let config = Config::load();

    // Spawn the formatter and store workers
    let measure = ApproxMeasure {
        column_px: config.column_px,
        tab_columns: config.tab_columns,
    };
    let (engine, mut engine_events) =
        spawn_engine(move || Box::new(measure) as Box<dyn TextMeasure>);

    let stream_id = source_kind.name();
    engine.init(vec![stream_id.clone()]).await?;

    // Initialize state
    let mut state = ViewerState::new(config, stream_id, engine);

    // Start the chunk source stream
    let mut chunk_rx = source.stream().await;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
        original_hook(panic);
    }));

    // Main event loop
    let result = run_event_loop(&mut terminal, &mut state, &mut chunk_rx, &mut engine_events).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableMouseCapture, LeaveAlternateScreen)?;

    result
}

/// Structured logging goes to a file so the TTY stays clean. Enabled by
/// setting LONGVIEW_LOG to a path; filtered via RUST_LOG.
fn init_tracing() {
    let Ok(path) = std::env::var("LONGVIEW_LOG") else {
        return;
    };
    match std::fs::File::create(&path) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .try_init();
        }
        Err(e) => eprintln!("could not open log file {path}: {e}"),
    }
}

async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut ViewerState<'_>,
    chunk_rx: &mut mpsc::Receiver<ChunkEvent>,
    engine_events: &mut mpsc::Receiver<EngineEvent>,
) -> Result<()> {
    loop {
        // Map the terminal body onto a pixel viewport: the log area loses the
        // minimap strip horizontally and header/status/search rows vertically.
        let size = terminal.size()?;
        let body_cols = size.width.saturating_sub(MINIMAP_WIDTH) as f64;
        let body_rows = size.height.saturating_sub(3) as f64;
        let width = body_cols * state.config.column_px as f64;
        let height = body_rows * state.config.item_height as f64;
        let changed = match state.viewport {
            Some(v) => v.width != width || v.height != height,
            None => width > 0.0 && height > 0.0,
        };
        if changed {
            state.resize(width, height);
        }

        // Draw UI
        terminal.draw(|frame| {
            ui::draw(frame, state);
        })?;

        // Handle terminal input, source chunks, and engine responses
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(16)) => {
                // Poll for events with no blocking
                if event::poll(Duration::ZERO)? {
                    match event::read()? {
                        Event::Key(key) => {
                            // Only handle key press events (not release)
                            if key.kind == KeyEventKind::Press {
                                input::handle_key(state, key);
                            }
                        }
                        Event::Mouse(mouse) => {
                            input::handle_mouse(state, mouse, size.width, size.height);
                        }
                        _ => {}
                    }
                }
            }

            Some(chunk_event) = chunk_rx.recv() => {
                match chunk_event {
                    ChunkEvent::Chunks(chunks) => {
                        state.append_chunks(chunks);
                    }
                    ChunkEvent::Error(msg) => {
                        state.err_message = Some(msg);
                    }
                    ChunkEvent::EndOfStream => {
                        state.status_message = Some("stream ended".to_string());
                    }
                }
            }

            Some(engine_event) = engine_events.recv() => {
                state.handle_engine_event(engine_event);
            }
        }

        // Check if we should quit
        if state.should_quit {
            break;
        }
    }

    Ok(())
}
