//! Core ducking state machine
//!
//! Handles transitions between Idle, Ducking and FadingIn based on the
//! classifier's edges, and starts or stops the whole pipeline on mode
//! signals. It is the only consumer of the input queue, so every handler
//! runs to completion before the next input is looked at.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use crate::config::DuckerConfig;
use crate::events::DuckerEvent;
use crate::gain::{FadeProgress, GainController, GainDevice};
use crate::levels::{Edge, LevelClassifier, LevelSample, MicrophoneId};
use crate::mode::{ModeCoordinator, ModeSignal, MonitoringCommand};
use crate::store::{complete_setup, reconcile_baseline, BaselineStore, Reconciliation};

/// The three ducking states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuckingState {
    /// Ceiling mics at baseline
    #[default]
    Idle,
    /// Ceiling mics lowered while an amplified mic is live
    Ducking,
    /// Ceiling mics climbing back toward baseline
    FadingIn,
}

impl std::fmt::Display for DuckingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuckingState::Idle => write!(f, "Idle"),
            DuckingState::Ducking => write!(f, "Ducking"),
            DuckingState::FadingIn => write!(f, "FadingIn"),
        }
    }
}

/// Everything the state machine reacts to, in arrival order
#[derive(Debug, Clone)]
pub enum Input {
    /// VU reading from an amplified mic
    Sample(LevelSample),
    /// Call, mute or peer-mode signal
    Signal(ModeSignal),
    /// The bridge reported a hardware level
    GainReported,
    /// Stop monitoring directly
    Stop,
}

/// The state machine that owns all ducking state
pub struct DuckingStateMachine {
    state: DuckingState,
    /// Whether samples are currently being acted on
    monitoring: bool,
    classifier: LevelClassifier,
    controller: GainController,
    coordinator: ModeCoordinator,
    amplified: Vec<MicrophoneId>,
    sample_interval_ms: u64,
    show_ducking_alert: bool,
    /// Time when current non-Idle state was entered
    state_entered_at: Option<Instant>,
    store: Option<Arc<dyn BaselineStore>>,
    /// Setup is waiting for every ceiling mic to report a level
    setup_pending: bool,
    event_tx: broadcast::Sender<DuckerEvent>,
}

impl DuckingStateMachine {
    pub fn new(
        config: &DuckerConfig,
        device: Arc<dyn GainDevice>,
        event_tx: broadcast::Sender<DuckerEvent>,
    ) -> Self {
        let controller = GainController::new(
            device,
            &config.microphones.ceiling,
            config.ducking_value,
            config.fade_in_step,
            event_tx.clone(),
        );

        Self {
            state: DuckingState::Idle,
            monitoring: false,
            classifier: LevelClassifier::new(config.thresholds),
            controller,
            coordinator: ModeCoordinator::new(),
            amplified: config.microphones.amplified.clone(),
            sample_interval_ms: config.sample_interval_ms,
            show_ducking_alert: config.show_ducking_alert,
            state_entered_at: None,
            store: None,
            setup_pending: false,
            event_tx,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> DuckingState {
        self.state
    }

    #[cfg(test)]
    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    #[cfg(test)]
    pub fn controller(&self) -> &GainController {
        &self.controller
    }

    /// Settle the baseline against the store before any input is handled
    pub async fn initialize(&mut self, store: Arc<dyn BaselineStore>) -> Reconciliation {
        let outcome = reconcile_baseline(store.as_ref(), &mut self.controller, &self.event_tx).await;
        if outcome == Reconciliation::AwaitingGains {
            info!(missing = ?self.controller.bank().missing(), "setup deferred until ceiling mics report");
            self.setup_pending = true;
        } else {
            info!(?outcome, baseline = ?self.controller.bank().baseline_map(), "baseline ready");
        }
        self.store = Some(store);
        outcome
    }

    /// Run the state machine until every input sender is gone
    pub async fn run(&mut self, mut input_rx: mpsc::Receiver<Input>) {
        info!("state machine started in Idle state");

        while let Some(input) = input_rx.recv().await {
            self.handle(input).await;
        }

        info!("state machine stopped");
    }

    /// Handle one input to completion
    pub async fn handle(&mut self, input: Input) {
        match input {
            Input::Sample(sample) => self.handle_sample(sample).await,
            Input::Signal(signal) => match self.coordinator.translate(&signal) {
                Some(MonitoringCommand::Start) => self.start_monitoring().await,
                Some(MonitoringCommand::Stop) => self.stop_monitoring().await,
                None => {}
            },
            Input::GainReported => self.retry_setup().await,
            Input::Stop => self.stop_monitoring().await,
        }
    }

    /// Finish a deferred setup once the missing levels have come in
    async fn retry_setup(&mut self) {
        if !self.setup_pending {
            return;
        }
        let Some(store) = self.store.clone() else {
            return;
        };
        if complete_setup(store.as_ref(), &mut self.controller, &self.event_tx).await {
            info!(baseline = ?self.controller.bank().baseline_map(), "deferred setup complete");
            self.setup_pending = false;
        }
    }

    async fn handle_sample(&mut self, sample: LevelSample) {
        if !self.monitoring {
            trace!(mic = %sample.mic, "sample dropped, not monitoring");
            return;
        }
        if !self.amplified.contains(&sample.mic) {
            trace!(mic = %sample.mic, "sample dropped, not an amplified mic");
            return;
        }
        if self.setup_pending || !self.controller.is_ready() {
            trace!(mic = %sample.mic, "sample dropped, baseline not known yet");
            return;
        }

        let ducking = self.state == DuckingState::Ducking;
        match self.classifier.classify(&sample, ducking) {
            Some(Edge::EnterDucking) => {
                // also taken from FadingIn: the fade is abandoned and ducking restarts from baseline
                self.controller.duck_all().await;
                self.transition_to(DuckingState::Ducking);
                if self.show_ducking_alert {
                    self.emit(DuckerEvent::alert(
                        "Ducking Active",
                        "Amplified Mic detected, ducking ceiling mics....",
                        0,
                    ));
                }
                return;
            }
            Some(Edge::ExitDucking) => {
                // fade starts on the next sample
                self.transition_to(DuckingState::FadingIn);
                return;
            }
            None => {}
        }

        if self.state == DuckingState::FadingIn
            && self.controller.fade_step().await == FadeProgress::Converged
        {
            self.transition_to(DuckingState::Idle);
            if self.show_ducking_alert {
                self.emit(DuckerEvent::AlertCleared);
            }
        }
    }

    async fn start_monitoring(&mut self) {
        if self.monitoring {
            debug!("monitoring already running");
            return;
        }

        info!(mics = ?self.amplified, "starting ducking automation");
        if self.setup_pending {
            self.retry_setup().await;
        } else {
            self.controller.refresh_baseline().await;
        }
        self.classifier.reset();
        if self.state != DuckingState::Idle {
            self.transition_to(DuckingState::Idle);
        }
        self.monitoring = true;

        self.emit(DuckerEvent::MonitoringStarted {
            mics: self.amplified.clone(),
            interval_ms: self.sample_interval_ms,
        });
    }

    async fn stop_monitoring(&mut self) {
        info!(state = %self.state, "stopping ducking automation");
        let was_active = self.state != DuckingState::Idle;

        self.monitoring = false;
        self.emit(DuckerEvent::MonitoringStopped);

        // any fade in progress is dropped in favour of a direct restore
        self.classifier.reset();
        self.controller.restore_all().await;
        if was_active {
            self.transition_to(DuckingState::Idle);
            if self.show_ducking_alert {
                self.emit(DuckerEvent::AlertCleared);
            }
        }
    }

    /// Perform a state transition
    fn transition_to(&mut self, new_state: DuckingState) {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.state_entered_at = if new_state != DuckingState::Idle {
            Some(Instant::now())
        } else {
            None
        };

        self.emit(DuckerEvent::StateChanged {
            from: old_state,
            to: new_state,
        });
    }

    fn emit(&self, event: DuckerEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }
}
