use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

use touch_diag::bus::{ConnectionEvent, LocalBus, MessageBus, RosbridgeBus};
use touch_diag::checks::SurfaceInput;
use touch_diag::parser::{self, SuiteDefinition};
use touch_diag::runner::{Command, ConsoleEventListener, SuiteExecutor, SuiteHandle};
use touch_diag::scoring::{self, Point, ScoringThresholds, Shape};
use touch_diag::utils::config::Config;

#[derive(Parser)]
#[command(name = "touch-diag")]
#[command(version = "0.1.0")]
#[command(about = "Robot-actuated touch device diagnostics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a diagnostic suite, reading operator commands from stdin
    Run {
        /// Suite definition (YAML). The built-in suite is used if omitted.
        #[arg(short, long)]
        suite: Option<PathBuf>,

        /// Configuration file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Rosbridge websocket URL, overrides the config file
        #[arg(long)]
        url: Option<String>,

        /// Hardware id stamped on published reports
        #[arg(long)]
        hardware_id: Option<String>,

        /// Use an in-process bus instead of connecting to rosbridge
        #[arg(long, default_value = "false")]
        offline: bool,

        /// Start the suite immediately
        #[arg(long, default_value = "false")]
        auto_start: bool,
    },

    /// Score a recorded trace (JSON array of points) against a shape
    Score {
        /// Path to the trace file
        trace: PathBuf,

        /// Target shape (square, circle, diamond)
        #[arg(short, long, default_value = "square")]
        shape: String,

        #[arg(long, default_value = "200")]
        center_x: f64,

        #[arg(long, default_value = "200")]
        center_y: f64,

        /// Side length / diameter of the shape
        #[arg(long, default_value = "200")]
        size: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            suite,
            config,
            url,
            hardware_id,
            offline,
            auto_start,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            if let Some(url) = url {
                config.bus_url = url;
            }
            if let Some(id) = hardware_id {
                config.hardware_id = id;
            }

            let suite = match suite {
                Some(path) => parser::parse_suite_file(&path)?,
                None => SuiteDefinition::builtin(),
            };

            println!(
                "{} Suite: {} ({} steps)",
                "▶".green().bold(),
                suite.name().white().bold(),
                suite.len()
            );

            let bus: Arc<dyn MessageBus> = if offline {
                println!("  Bus: {}", "offline".yellow());
                Arc::new(LocalBus::new())
            } else {
                println!("  Bus: {}", config.bus_url.cyan());
                Arc::new(connect_bus(&config).await)
            };

            run_suite(suite, config, bus, auto_start).await?;
        }

        Commands::Score {
            trace,
            shape,
            center_x,
            center_y,
            size,
        } => {
            let Some(shape) = Shape::from_name(&shape) else {
                anyhow::bail!("Unknown shape: {} (expected square, circle or diamond)", shape);
            };
            if !(size > 0.0) {
                anyhow::bail!("Shape size must be positive, got {}", size);
            }
            let points = parser::parse_trace_file(&trace)?;
            let thresholds = ScoringThresholds::for_size(size);
            let result = scoring::score_with(
                &points,
                shape,
                Point::new(center_x, center_y),
                size,
                &thresholds,
            );

            let accuracy = format!("{}%", result.accuracy);
            let accuracy = if result.accuracy >= 80 {
                accuracy.green().bold()
            } else if result.accuracy >= 50 {
                accuracy.yellow().bold()
            } else {
                accuracy.red().bold()
            };
            println!("{} {} trace: {}", "■".blue(), shape.name(), trace.display());
            println!("  Accuracy: {}", accuracy);
            println!("  Path length: {:.1}px", result.total_distance);
            println!(
                "  Points on shape: {}/{}",
                result.valid_points,
                points.len()
            );
            match result.mean_deviation {
                Some(mean) => println!("  Mean deviation: {:.1}px", mean),
                None => println!("  Mean deviation: {}", "n/a".dimmed()),
            }
        }
    }

    Ok(())
}

/// Connect to rosbridge and keep reconnecting after a fixed delay whenever
/// the connection drops or cannot be established
async fn connect_bus(config: &Config) -> RosbridgeBus {
    let bus = RosbridgeBus::new(&config.bus_url);
    let mut events = bus.events();
    let delay = Duration::from_millis(config.reconnect_delay_ms);

    let supervised = bus.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Connected) => {}
                Ok(ConnectionEvent::Error(_)) | Ok(ConnectionEvent::Closed) => {
                    if supervised.is_connected() {
                        continue;
                    }
                    tokio::time::sleep(delay).await;
                    if supervised.is_connected() {
                        continue;
                    }
                    log::info!("reconnecting to {}", supervised.url());
                    if let Err(e) = supervised.reconnect().await {
                        log::warn!("{}", e);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = bus.reconnect().await {
        log::warn!("{}; retrying in {}ms", e, config.reconnect_delay_ms);
    }
    bus
}

async fn run_suite(
    suite: SuiteDefinition,
    config: Config,
    bus: Arc<dyn MessageBus>,
    auto_start: bool,
) -> anyhow::Result<()> {
    let (executor, handle) = SuiteExecutor::new(suite, config, bus);
    let listener = tokio::spawn(ConsoleEventListener::listen(handle.subscribe()));
    let mut runner = tokio::spawn(executor.run());

    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        println!("\n{} Stopping...", "⏹".yellow());
        ctrlc_handle.shutdown();
    })?;

    println!(
        "  Commands: {}",
        "start, pause, resume, skip, retry, continue, republish, status, quit".dimmed()
    );
    println!("  Surface input: one JSON object per line");

    if auto_start {
        if let Err(e) = handle.start().await {
            eprintln!("{} {}", "✗".red(), e);
        }
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stopped = false;
    loop {
        tokio::select! {
            _ = &mut runner => {
                stopped = true;
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&handle, line.trim()).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    handle.shutdown();
    if !stopped {
        let _ = runner.await;
    }
    drop(handle);
    listener.abort();
    Ok(())
}

/// Handle one stdin line; returns false to quit
async fn handle_line(handle: &SuiteHandle, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }

    if line.starts_with('{') {
        match serde_json::from_str::<SurfaceInput>(line) {
            Ok(input) => {
                handle.surface(input);
            }
            Err(e) => eprintln!("{} invalid surface input: {}", "✗".red(), e),
        }
        return true;
    }

    let command = match line {
        "start" => Command::Start,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "skip" => Command::Skip,
        "retry" => Command::Retry,
        "continue" => Command::ManualContinue,
        "republish" => {
            match handle.republish().await {
                Ok(true) => {}
                Ok(false) => eprintln!("{} publish failed; is the bus connected?", "!".red()),
                Err(e) => eprintln!("{} {}", "✗".red(), e),
            }
            return true;
        }
        "status" => {
            let snapshot = handle.snapshot();
            match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("{} {}", "✗".red(), e),
            }
            return true;
        }
        "quit" | "exit" => return false,
        other => {
            eprintln!("{} unknown command: {}", "?".yellow(), other);
            return true;
        }
    };

    if let Err(e) = handle.send(command).await {
        eprintln!("{} {}", "✗".red(), e);
    }
    true
}
