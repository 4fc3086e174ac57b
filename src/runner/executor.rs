//! Suite executor
//!
//! A single actor owns the [`SuiteState`] and processes one input at a time:
//! operator commands, surface input, timer firings and confirmations. State
//! changes go through [`reduce`]; the executor only interprets the returned
//! effects. Every timer and confirmation wait carries the [`StepToken`] it
//! was created for and is dropped on arrival if the suite has moved on.

use super::confirmation::ConfirmationGateway;
use super::events::{EventEmitter, SuiteEvent};
use super::machine::{reduce, Action, Effect, TransitionError};
use super::state::{StepToken, SuiteSnapshot, SuiteState};
use crate::bus::MessageBus;
use crate::checks::{self, CheckProgress, CheckTimer, DiagnosticCheck, SurfaceInput, TestKind};
use crate::parser::SuiteDefinition;
use crate::report::{self, ReportPublisher};
use crate::utils::config::Config;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Operator commands forwarded by the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Skip,
    Retry,
    ManualContinue,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("suite executor has stopped")]
    Stopped,
    #[error("the suite has not finished yet")]
    NotFinished,
}

enum Input {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<(), OrchestratorError>>,
    },
    Republish {
        reply: oneshot::Sender<Result<bool, OrchestratorError>>,
    },
    Surface {
        input: SurfaceInput,
        /// Activation that was current when the input arrived
        token: StepToken,
        received_at: Instant,
    },
    CheckTimer {
        token: StepToken,
        timer: CheckTimer,
    },
    AdvanceElapsed {
        token: StepToken,
    },
    Confirmed {
        token: StepToken,
        key: TestKind,
    },
    Shutdown,
}

/// Cloneable handle used by the UI, the CLI and tests to drive the executor
#[derive(Clone)]
pub struct SuiteHandle {
    tx: mpsc::UnboundedSender<Input>,
    snapshot: watch::Receiver<SuiteSnapshot>,
    events: EventEmitter,
}

impl SuiteHandle {
    async fn command(&self, command: Command) -> Result<(), OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Input::Command { command, reply })
            .map_err(|_| OrchestratorError::Stopped)?;
        rx.await.map_err(|_| OrchestratorError::Stopped)?
    }

    pub async fn start(&self) -> Result<(), OrchestratorError> {
        self.command(Command::Start).await
    }

    pub async fn pause(&self) -> Result<(), OrchestratorError> {
        self.command(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<(), OrchestratorError> {
        self.command(Command::Resume).await
    }

    pub async fn skip(&self) -> Result<(), OrchestratorError> {
        self.command(Command::Skip).await
    }

    pub async fn retry(&self) -> Result<(), OrchestratorError> {
        self.command(Command::Retry).await
    }

    pub async fn manual_continue(&self) -> Result<(), OrchestratorError> {
        self.command(Command::ManualContinue).await
    }

    pub async fn send(&self, command: Command) -> Result<(), OrchestratorError> {
        self.command(command).await
    }

    /// Publish the final report again. Returns the transport's success flag.
    pub async fn republish(&self) -> Result<bool, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Input::Republish { reply })
            .map_err(|_| OrchestratorError::Stopped)?;
        rx.await.map_err(|_| OrchestratorError::Stopped)?
    }

    /// Queue an input for the check that is active right now. Input that is
    /// still queued when that check is stopped or restarted is dropped.
    /// Returns false once the executor has stopped.
    pub fn surface(&self, input: SurfaceInput) -> bool {
        let token = self.snapshot.borrow().state.token();
        self.tx
            .send(Input::Surface {
                input,
                token,
                received_at: Instant::now(),
            })
            .is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Input::Shutdown);
    }

    pub fn snapshot(&self) -> SuiteSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SuiteSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SuiteEvent> {
        self.events.subscribe()
    }
}

struct ActiveCheck {
    token: StepToken,
    check: Box<dyn DiagnosticCheck>,
}

pub struct SuiteExecutor {
    suite: SuiteDefinition,
    config: Config,
    state: SuiteState,
    session_id: Option<String>,
    last_publish_ok: Option<bool>,

    check: Option<ActiveCheck>,
    check_timers: Vec<JoinHandle<()>>,
    advance_timer: Option<JoinHandle<()>>,
    confirmation_task: Option<JoinHandle<()>>,
    gateway: ConfirmationGateway,
    publisher: ReportPublisher,

    /// Actions produced while applying effects, run after the current
    /// transition completes
    followups: Vec<Action>,
    clock: Instant,
    events: EventEmitter,
    snapshot: watch::Sender<SuiteSnapshot>,
    rx: mpsc::UnboundedReceiver<Input>,
    // Weak so the loop ends once every handle is gone
    tx: mpsc::WeakUnboundedSender<Input>,
}

impl SuiteExecutor {
    pub fn new(
        suite: SuiteDefinition,
        config: Config,
        bus: Arc<dyn MessageBus>,
    ) -> (Self, SuiteHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(SuiteSnapshot::default());
        let events = EventEmitter::default();

        let gateway = ConfirmationGateway::new(
            bus.clone(),
            &config.confirmation_topic,
            &config.confirmation_type,
        );
        let publisher = ReportPublisher::new(bus, &config, suite.name());

        let handle = SuiteHandle {
            tx: tx.clone(),
            snapshot: snapshot_rx,
            events: events.clone(),
        };
        let executor = Self {
            suite,
            config,
            state: SuiteState::new(),
            session_id: None,
            last_publish_ok: None,
            check: None,
            check_timers: Vec::new(),
            advance_timer: None,
            confirmation_task: None,
            gateway,
            publisher,
            followups: Vec::new(),
            clock: Instant::now(),
            events,
            snapshot,
            rx,
            tx: tx.downgrade(),
        };
        (executor, handle)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SuiteEvent> {
        self.events.subscribe()
    }

    /// Process inputs until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        log::info!("suite '{}' ready ({} steps)", self.suite.name(), self.suite.len());
        while let Some(input) = self.rx.recv().await {
            match input {
                Input::Shutdown => break,
                Input::Command { command, reply } => {
                    let result = self.handle_command(command);
                    if let Err(e) = &result {
                        log::warn!("{:?} rejected: {}", command, e);
                    }
                    let _ = reply.send(result);
                }
                Input::Republish { reply } => {
                    let _ = reply.send(self.republish());
                }
                Input::Surface {
                    input,
                    token,
                    received_at,
                } => self.handle_surface(input, token, received_at),
                Input::CheckTimer { token, timer } => self.handle_check_timer(token, timer),
                Input::AdvanceElapsed { token } => {
                    self.dispatch_logged(Action::AdvanceElapsed { token });
                }
                Input::Confirmed { token, key } => {
                    if token != self.state.token() {
                        log::debug!("dropping confirmation for stale step {}", token.step_index);
                        continue;
                    }
                    self.dispatch_logged(Action::ConfirmationReceived { key });
                }
            }
        }
        self.teardown();
        log::info!("suite executor stopped");
    }

    fn handle_command(&mut self, command: Command) -> Result<(), OrchestratorError> {
        let action = match command {
            Command::Start => Action::Start,
            Command::Pause => Action::Pause,
            Command::Resume => Action::Resume,
            Command::Skip => Action::Skip,
            Command::Retry => Action::Retry,
            Command::ManualContinue => Action::ManualContinue,
        };
        self.dispatch(action)?;
        Ok(())
    }

    fn republish(&mut self) -> Result<bool, OrchestratorError> {
        if !self.state.is_terminal() {
            return Err(OrchestratorError::NotFinished);
        }
        let ok = self.publisher.publish(&self.state.results);
        self.last_publish_ok = Some(ok);
        self.events.emit(SuiteEvent::ReportPublished {
            kind: None,
            success: ok,
        });
        self.publish_snapshot();
        Ok(ok)
    }

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    fn handle_surface(&mut self, input: SurfaceInput, token: StepToken, received_at: Instant) {
        let now = self.now_ms();
        let latency_ms = received_at.elapsed().as_secs_f64() * 1000.0;
        let Some(active) = self.check.as_mut().filter(|a| a.token == token) else {
            log::debug!("no check for step {}; dropping {:?}", token.step_index, input);
            return;
        };
        let progress = active.check.handle_input(&input, now, latency_ms);
        if let Some(action) = self.on_progress(token, progress) {
            self.dispatch_logged(action);
        }
    }

    fn handle_check_timer(&mut self, token: StepToken, timer: CheckTimer) {
        let now = self.now_ms();
        let Some(active) = self.check.as_mut().filter(|a| a.token == token) else {
            log::debug!("dropping stale {:?} for step {}", timer, token.step_index);
            return;
        };
        let progress = active.check.handle_timer(timer, now);
        if let Some(action) = self.on_progress(token, progress) {
            self.dispatch_logged(action);
        }
    }

    /// Arm requested timers; a finished check turns into a completion action
    fn on_progress(&mut self, token: StepToken, progress: CheckProgress) -> Option<Action> {
        match progress {
            CheckProgress::Pending => None,
            CheckProgress::Schedule(timers) => {
                for scheduled in timers {
                    let handle = self.spawn_after(
                        scheduled.after,
                        Input::CheckTimer {
                            token,
                            timer: scheduled.timer,
                        },
                    );
                    self.check_timers.push(handle);
                }
                None
            }
            CheckProgress::Finished(result) => Some(Action::StepCompleted(result)),
        }
    }

    fn dispatch_logged(&mut self, action: Action) {
        if let Err(e) = self.dispatch(action) {
            log::error!("internal transition rejected: {}", e);
        }
    }

    fn dispatch(&mut self, action: Action) -> Result<(), TransitionError> {
        let (next, effects) = reduce(&self.suite, &self.state, action.clone())?;
        let previous = std::mem::replace(&mut self.state, next);
        self.announce(&action, &previous);
        for effect in effects {
            self.apply(effect);
        }
        self.publish_snapshot();

        for followup in std::mem::take(&mut self.followups) {
            self.dispatch_logged(followup);
        }
        Ok(())
    }

    fn step_id(&self, index: usize) -> String {
        self.suite
            .step(index)
            .map(|s| s.id.clone())
            .unwrap_or_default()
    }

    /// Emit the events describing an accepted action
    fn announce(&mut self, action: &Action, previous: &SuiteState) {
        let step_id = self.step_id(previous.step_index);
        match action {
            Action::Start => {
                let session_id = uuid::Uuid::new_v4().to_string();
                log::info!("session {} started", session_id);
                self.events.emit(SuiteEvent::SessionStarted {
                    session_id: session_id.clone(),
                    suite_name: self.suite.name().to_string(),
                    step_count: self.suite.len(),
                });
                self.session_id = Some(session_id);
            }
            Action::StepCompleted(result) => {
                log::info!("step {} completed", step_id);
                self.events.emit(SuiteEvent::StepCompleted {
                    index: previous.step_index,
                    step_id,
                    kind: result.kind(),
                    score: report::category_score(result),
                });
            }
            Action::StepFailed { reason } => {
                self.events.emit(SuiteEvent::StepFailed {
                    index: previous.step_index,
                    step_id,
                    error: reason.clone(),
                });
            }
            Action::ConfirmationReceived { .. } if previous.phase != self.state.phase => {
                log::info!("step {} confirmed", step_id);
                self.events.emit(SuiteEvent::Confirmed {
                    step_id,
                    manual: false,
                });
            }
            Action::ManualContinue => {
                log::info!("step {} continued manually", step_id);
                self.events.emit(SuiteEvent::Confirmed {
                    step_id,
                    manual: true,
                });
            }
            Action::Pause => {
                log::info!("paused at {}", step_id);
                self.events.emit(SuiteEvent::Paused { step_id });
            }
            Action::Resume => {
                log::info!("resumed at {}", step_id);
                self.events.emit(SuiteEvent::Resumed { step_id });
            }
            Action::Skip => {
                log::info!("skipped {}", step_id);
                self.events.emit(SuiteEvent::StepSkipped {
                    index: previous.step_index,
                    step_id,
                });
            }
            Action::Retry => {
                if self.session_id.is_none() {
                    self.session_id = Some(uuid::Uuid::new_v4().to_string());
                }
                self.last_publish_ok = None;
                log::info!("retrying suite (generation {})", self.state.generation);
                self.events.emit(SuiteEvent::Retried {
                    generation: self.state.generation,
                });
            }
            Action::ConfirmationReceived { .. } | Action::AdvanceElapsed { .. } => {}
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::ActivateStep { token } => self.activate(token),
            Effect::StopCheck => {
                self.check = None;
                for timer in self.check_timers.drain(..) {
                    timer.abort();
                }
            }
            Effect::ScheduleAdvance { token } => {
                let delay = Duration::from_millis(self.config.settle_delay_ms);
                let handle = self.spawn_after(delay, Input::AdvanceElapsed { token });
                if let Some(old) = self.advance_timer.replace(handle) {
                    old.abort();
                }
            }
            Effect::CancelAdvance => {
                if let Some(timer) = self.advance_timer.take() {
                    timer.abort();
                }
            }
            Effect::AwaitConfirmation { token, key } => self.await_confirmation(token, key),
            Effect::CancelConfirmation => {
                self.gateway.cancel();
                if let Some(task) = self.confirmation_task.take() {
                    task.abort();
                }
            }
            Effect::ResolveConfirmation => {
                if !self.gateway.manual_continue() {
                    log::debug!("no confirmation wait to resolve");
                }
                // Left to finish; its token is stale once the suite advanced
                self.confirmation_task = None;
            }
            Effect::ResultRecorded { kind } => {
                if !self.config.publish_each_test {
                    return;
                }
                if let Some(result) = self.state.results.get(kind) {
                    let ok = self.publisher.publish_test(result);
                    self.events.emit(SuiteEvent::ReportPublished {
                        kind: Some(kind),
                        success: ok,
                    });
                }
            }
            Effect::PublishReport => {
                let ok = self.publisher.publish(&self.state.results);
                self.last_publish_ok = Some(ok);
                self.events.emit(SuiteEvent::ReportPublished {
                    kind: None,
                    success: ok,
                });
                let summary = self.state.summary(&self.suite);
                self.events.emit(SuiteEvent::SuiteFinished {
                    overall_score: report::composite_score(&self.state.results),
                    completed: summary.completed,
                    errored: summary.error,
                });
            }
        }
    }

    fn activate(&mut self, token: StepToken) {
        let Some(step) = self.suite.step(token.step_index) else {
            log::error!("no step at index {}", token.step_index);
            return;
        };
        let (step_id, kind) = (step.id.clone(), step.kind);
        self.events.emit(SuiteEvent::StepActivated {
            index: token.step_index,
            step_id: step_id.clone(),
            title: step.title.clone(),
        });

        let Some(kind) = kind else {
            let message = format!("reached {} with no recorded results; retry to run again", step_id);
            log::warn!("{}", message);
            self.events.emit(SuiteEvent::Log { message });
            return;
        };
        log::info!("running {} ({})", step_id, kind);

        match checks::build(kind, &self.config) {
            Ok(mut check) => {
                let progress = check.begin(self.now_ms());
                self.check = Some(ActiveCheck { token, check });
                if let Some(action) = self.on_progress(token, progress) {
                    self.followups.push(action);
                }
            }
            Err(e) => {
                log::warn!("cannot run {}: {}", step_id, e);
                self.followups.push(Action::StepFailed {
                    reason: e.to_string(),
                });
            }
        }
    }

    fn await_confirmation(&mut self, token: StepToken, key: TestKind) {
        let payload = key.confirmation_payload();
        match self.gateway.await_confirmation(&payload) {
            Ok(wait) => {
                let tx = self.tx.clone();
                let task = tokio::spawn(async move {
                    wait.await;
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(Input::Confirmed { token, key });
                    }
                });
                if let Some(old) = self.confirmation_task.replace(task) {
                    old.abort();
                }
                self.events.emit(SuiteEvent::AwaitingConfirmation {
                    step_id: self.step_id(token.step_index),
                    payload,
                });
            }
            Err(e) => {
                log::error!("confirmation wait rejected: {}", e);
                debug_assert!(false, "overlapping confirmation waits: {}", e);
            }
        }
    }

    fn spawn_after(&self, after: Duration, input: Input) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(input);
            }
        })
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(SuiteSnapshot {
            session_id: self.session_id.clone(),
            state: self.state.clone(),
            overall_score: report::composite_score(&self.state.results),
            last_publish_ok: self.last_publish_ok,
        });
    }

    fn teardown(&mut self) {
        self.gateway.cancel();
        self.check = None;
        for task in self
            .check_timers
            .drain(..)
            .chain(self.advance_timer.take())
            .chain(self.confirmation_task.take())
        {
            task.abort();
        }
    }
}
