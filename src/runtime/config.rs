//! Per-run configuration.

use crate::types::ClampInput;

/// Knobs for one call to the run entry points.
///
/// Defaults: trial count taken from the supplied input sets, origin inputs
/// zeroed after the first execution set, learning and control phases
/// enabled when the system has them, no simulation, targets required
/// whenever learning will run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Number of trials; `None` runs one trial per supplied input set.
    /// When larger than the number of input sets, inputs cycle.
    pub num_trials: Option<usize>,
    /// What happens to origin inputs after the first execution set.
    pub clamp_input: ClampInput,
    /// Run the learning phase (when the system has a learning graph).
    pub learning: bool,
    /// Run the control phase (when the system has a controller).
    pub control: bool,
    /// Simulation runs suppress learning and control regardless of the
    /// flags above.
    pub simulation: bool,
    /// Treat controller failures as advisory instead of fatal.
    pub init_probe: bool,
    /// Substitute zero vectors for missing targets (logged) instead of
    /// rejecting the run.
    pub allow_default_targets: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            num_trials: None,
            clamp_input: ClampInput::default(),
            learning: true,
            control: true,
            simulation: false,
            init_probe: false,
            allow_default_targets: false,
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn num_trials(mut self, trials: usize) -> Self {
        self.num_trials = Some(trials);
        self
    }

    #[must_use]
    pub fn clamp_input(mut self, clamp: ClampInput) -> Self {
        self.clamp_input = clamp;
        self
    }

    #[must_use]
    pub fn learning(mut self, enabled: bool) -> Self {
        self.learning = enabled;
        self
    }

    #[must_use]
    pub fn control(mut self, enabled: bool) -> Self {
        self.control = enabled;
        self
    }

    #[must_use]
    pub fn simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    #[must_use]
    pub fn init_probe(mut self, probe: bool) -> Self {
        self.init_probe = probe;
        self
    }

    #[must_use]
    pub fn allow_default_targets(mut self, allow: bool) -> Self {
        self.allow_default_targets = allow;
        self
    }
}
