//! Trigger wiring: decides when to pull, push or run a full sync.
//!
//! The decision logic lives in [`Scheduler::on_event`], a pure state
//! transition over [`Event`]s. [`Scheduler::run`] only turns signals,
//! mutations and timers into events and executes the resulting actions.

use crate::sync::{RunOutcome, RunReport, SyncMode, Syncer};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Environment signals fed to the scheduler by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Online,
    Offline,
    Visible,
    Hidden,
    /// The host is about to terminate
    Shutdown,
}

/// Inputs of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Started,
    Signal(Signal),
    /// The application wrote to the local store
    Mutation,
    /// The periodic pull interval elapsed
    Tick,
    /// The debounce quiet window elapsed
    DebounceElapsed,
}

/// What the scheduler decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run(SyncMode),
    /// Stop the loop, pushing first if `push` is set
    Shutdown { push: bool },
}

/// Scheduler timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Quiet window after the last mutation before pushing
    pub debounce: Duration,
    pub pull_interval: Duration,
    /// Upper bound on the push at shutdown
    pub shutdown_grace: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            pull_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Mutable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub online: bool,
    pub visible: bool,
    /// When the pending debounced push fires
    pub debounce_deadline: Option<Instant>,
    /// Local changes exist that no push has uploaded yet
    pub push_owed: bool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            online: true,
            visible: true,
            debounce_deadline: None,
            push_owed: false,
        }
    }
}

/// Drives a [`Syncer`] from environment signals and local mutations.
#[derive(Debug)]
pub struct Scheduler {
    syncer: Arc<Syncer>,
    options: SchedulerOptions,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(syncer: Arc<Syncer>, options: SchedulerOptions) -> Self {
        Self {
            syncer,
            options,
            state: SchedulerState::default(),
        }
    }

    /// Start offline or online. Defaults to online.
    pub fn with_online(mut self, online: bool) -> Self {
        self.state.online = online;
        self
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Apply `event` at `now` and decide the action, if any.
    pub fn on_event(&mut self, event: Event, now: Instant) -> Option<Action> {
        let state = &mut self.state;
        match event {
            Event::Started | Event::Signal(Signal::Online) => {
                if event == Event::Signal(Signal::Online) {
                    state.online = true;
                }
                self.pull_action()
            }
            Event::Signal(Signal::Offline) => {
                state.online = false;
                None
            }
            Event::Signal(Signal::Visible) => {
                state.visible = true;
                self.pull_action()
            }
            Event::Signal(Signal::Hidden) => {
                state.visible = false;
                None
            }
            Event::Tick => {
                if state.visible {
                    self.pull_action()
                } else {
                    None
                }
            }
            Event::Mutation => {
                state.push_owed = true;
                state.debounce_deadline = Some(now + self.options.debounce);
                None
            }
            Event::DebounceElapsed => {
                state.debounce_deadline = None;
                state.online.then_some(Action::Run(SyncMode::Push))
            }
            Event::Signal(Signal::Shutdown) => {
                state.debounce_deadline = None;
                Some(Action::Shutdown {
                    push: state.online,
                })
            }
        }
    }

    /// A pull trigger. Promoted to a full run while a push is owed so the
    /// checkpoint never moves past unpushed edits.
    fn pull_action(&mut self) -> Option<Action> {
        if !self.state.online {
            return None;
        }
        if self.state.push_owed {
            self.state.debounce_deadline = None;
            Some(Action::Run(SyncMode::Full))
        } else {
            Some(Action::Run(SyncMode::Pull))
        }
    }

    /// Record the result of a run.
    fn on_completed(&mut self, report: Option<&RunReport>) {
        let Some(report) = report else {
            return;
        };
        if report.mode.includes_push()
            && report.outcome != RunOutcome::NotConfigured
            && report.failed_pushes().is_empty()
        {
            self.state.push_owed = false;
        }
    }

    /// Run until shutdown or until `signals` closes.
    pub async fn run(mut self, mut signals: mpsc::Receiver<Signal>) {
        let mut mutations = self.syncer.local().subscribe();
        let mut mutations_open = true;

        match self.syncer.pending_changes().await {
            Ok(0) => {}
            Ok(pending) => {
                tracing::debug!(pending, "Unpushed local changes at startup");
                self.state.push_owed = true;
            }
            Err(err) => tracing::warn!(error = %err, "Could not count pending changes"),
        }

        let start = Instant::now();
        if let Some(action) = self.on_event(Event::Started, start) {
            if self.execute(action).await.is_break() {
                return;
            }
        }

        let period = self.options.pull_interval;
        let mut ticker = tokio::time::interval_at(start + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.state.debounce_deadline;
            let event = tokio::select! {
                signal = signals.recv() => Event::Signal(signal.unwrap_or(Signal::Shutdown)),
                mutation = mutations.recv(), if mutations_open => match mutation {
                    Ok(_) => Event::Mutation,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!(missed, "Mutation feed lagged");
                        Event::Mutation
                    }
                    Err(RecvError::Closed) => {
                        mutations_open = false;
                        continue;
                    }
                },
                _ = ticker.tick() => Event::Tick,
                _ = tokio::time::sleep_until(deadline.unwrap_or(start)), if deadline.is_some() => {
                    Event::DebounceElapsed
                }
            };

            tracing::trace!(?event, "Scheduler event");
            if let Some(action) = self.on_event(event, Instant::now()) {
                if self.execute(action).await.is_break() {
                    return;
                }
            }
        }
    }

    async fn execute(&mut self, action: Action) -> ControlFlow<()> {
        match action {
            Action::Run(mode) => {
                let report = self.syncer.trigger(mode).await;
                self.on_completed(report.as_ref());
                ControlFlow::Continue(())
            }
            Action::Shutdown { push } => {
                if push {
                    let grace = self.options.shutdown_grace;
                    match tokio::time::timeout(grace, self.syncer.push_now()).await {
                        Ok(Ok(_)) => tracing::info!("Pushed pending changes before shutdown"),
                        Ok(Err(err)) => tracing::warn!(error = %err, "Push at shutdown failed"),
                        Err(_) => tracing::warn!(?grace, "Push at shutdown timed out"),
                    }
                }
                tracing::info!("Scheduler stopped");
                ControlFlow::Break(())
            }
        }
    }
}
