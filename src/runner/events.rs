use crate::checks::TestKind;
use tokio::sync::broadcast;

/// Suite execution events for real-time updates
#[derive(Debug, Clone, PartialEq)]
pub enum SuiteEvent {
    // Session events
    SessionStarted {
        session_id: String,
        suite_name: String,
        step_count: usize,
    },
    SuiteFinished {
        overall_score: Option<u8>,
        completed: u32,
        errored: u32,
    },
    Retried {
        generation: u64,
    },
    Paused {
        step_id: String,
    },
    Resumed {
        step_id: String,
    },

    // Step events
    StepActivated {
        index: usize,
        step_id: String,
        title: String,
    },
    StepCompleted {
        index: usize,
        step_id: String,
        kind: TestKind,
        score: u8,
    },
    StepFailed {
        index: usize,
        step_id: String,
        error: String,
    },
    StepSkipped {
        index: usize,
        step_id: String,
    },
    AwaitingConfirmation {
        step_id: String,
        payload: String,
    },
    Confirmed {
        step_id: String,
        manual: bool,
    },

    // Bus events
    ReportPublished {
        kind: Option<TestKind>,
        success: bool,
    },

    Log {
        message: String,
    },
}

/// Event emitter for broadcasting suite events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<SuiteEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<SuiteEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: SuiteEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SuiteEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<SuiteEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        let is_tty = std::io::stdout().is_terminal();
        // Spinner and text for the active step
        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::debug!("console listener missed {} events", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                SuiteEvent::SessionStarted {
                    session_id,
                    suite_name,
                    step_count,
                } => {
                    println!(
                        "\n{} {} ({} steps) session {}",
                        "▶".green().bold(),
                        suite_name.white().bold(),
                        step_count,
                        session_id.cyan()
                    );
                }

                SuiteEvent::StepActivated { index, title, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    step_text = format!("[{}] {}", index, title);

                    let pb = ProgressBar::new_spinner();
                    if !is_tty {
                        // Piped output: no terminal escape codes
                        pb.set_draw_target(ProgressDrawTarget::hidden());
                    }
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("  {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    pb.set_message(format!("{}... ", step_text.dimmed()));
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                SuiteEvent::StepCompleted { kind, score, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let score_str = format!("{}%", score);
                    let score_str = if score >= 80 {
                        score_str.green()
                    } else if score >= 50 {
                        score_str.yellow()
                    } else {
                        score_str.red()
                    };
                    println!("  {} {} {} {}", "✓".green(), step_text, kind.to_string().dimmed(), score_str);
                }

                SuiteEvent::StepFailed { error, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("  {} {} {}", "✗".red(), step_text, error.red());
                }

                SuiteEvent::StepSkipped { .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("  {} {} {}", "○".yellow(), step_text, "(skipped)".dimmed());
                }

                SuiteEvent::AwaitingConfirmation { payload, .. } => {
                    println!(
                        "    {} waiting for {} (type 'continue' to override)",
                        "…".yellow(),
                        payload.cyan()
                    );
                }

                SuiteEvent::Confirmed { manual, .. } => {
                    let how = if manual { "manually" } else { "by robot" };
                    println!("    {} confirmed {}", "✓".green(), how);
                }

                SuiteEvent::Paused { step_id } => {
                    if let Some(pb) = &spinner {
                        pb.set_message(format!("{} {}", step_text, "⏸ paused".yellow()));
                        pb.disable_steady_tick();
                    }
                    log::debug!("paused at {}", step_id);
                }

                SuiteEvent::Resumed { step_id } => {
                    if let Some(pb) = &spinner {
                        pb.set_message(format!("{}... ", step_text.dimmed()));
                        pb.enable_steady_tick(StdDuration::from_millis(100));
                    }
                    log::debug!("resumed at {}", step_id);
                }

                SuiteEvent::Retried { generation } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Retry #{}", "↻".yellow().bold(), generation);
                }

                SuiteEvent::ReportPublished { kind, success } => {
                    let what = kind.map_or("suite report".to_string(), |k| format!("{} result", k));
                    if success {
                        println!("    {} published {}", "↑".blue(), what);
                    } else {
                        println!("    {} failed to publish {}", "!".red().bold(), what);
                    }
                }

                SuiteEvent::SuiteFinished {
                    overall_score,
                    completed,
                    errored,
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("\n{} Suite finished", "■".blue().bold());
                    println!(
                        "  {} completed, {} errored",
                        completed.to_string().green(),
                        errored.to_string().red()
                    );
                    if let Some(score) = overall_score {
                        println!("  Overall score: {}", score.to_string().bold());
                    }
                }

                SuiteEvent::Log { message } => match &spinner {
                    Some(pb) => pb.println(format!("      {}", message)),
                    None => println!("      {}", message),
                },
            }
        }
    }
}
