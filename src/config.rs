//! Analysis options.
//!
//! Options are plain values handed to the engines by reference. There is no global state:
//! two analyses with different options can run side by side.

/// Decision procedure backing an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// CaDiCaL, incremental SAT solving.
    #[default]
    Sat,
    /// Binary decision diagrams, concrete inputs only.
    Bdd,
}

/// Flavour of the false positive search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FalsePositiveMode {
    /// One run per latch, the flip time step is symbolic.
    #[default]
    SymbTime,
    /// One run for all latches, both the latch and the flip time step are symbolic.
    SymbTimeLocation,
    /// [`SymbTime`](FalsePositiveMode::SymbTime) with free inputs in the test cases.
    SymbTimeFreeInputs,
    /// [`SymbTimeLocation`](FalsePositiveMode::SymbTimeLocation) with free inputs in the
    /// test cases.
    SymbTimeLocationFreeInputs,
}

impl FalsePositiveMode {
    /// Whether the latch is a symbolic choice (`c_j` selectors) instead of an outer loop.
    pub fn symbolic_location(self) -> bool {
        matches!(
            self,
            FalsePositiveMode::SymbTimeLocation | FalsePositiveMode::SymbTimeLocationFreeInputs
        )
    }

    pub fn free_inputs(self) -> bool {
        matches!(
            self,
            FalsePositiveMode::SymbTimeFreeInputs | FalsePositiveMode::SymbTimeLocationFreeInputs
        )
    }
}

/// Flavour of the definitely-protected search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectedMode {
    /// A flip in an arbitrary state must be detected or harmless within the same step.
    #[default]
    OneStep,
    /// The flip must be detected or masked within `k` steps.
    KStep(usize),
}

/// Options shared by the analyses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Number of latches belonging to the protection logic.
    ///
    /// These are the last latches of the circuit. They are never flipped and
    /// ignored when comparing states.
    pub num_err_latches: usize,
    /// Randomize the models returned by the SAT solver.
    pub rand_models: bool,
    /// Minimize the unsatisfiable cores returned by the SAT solver.
    pub min_cores: bool,
    /// Seed of every random number generator.
    pub seed: u64,
    /// Keep a full diagnostic trace for every vulnerability.
    pub diagnostic: bool,
    pub backend: Backend,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            num_err_latches: 0,
            rand_models: false,
            min_cores: false,
            seed: 0,
            diagnostic: true,
            backend: Backend::Sat,
        }
    }
}

impl Options {
    pub fn with_num_err_latches(mut self, n: usize) -> Self {
        self.num_err_latches = n;
        self
    }

    pub fn with_rand_models(mut self, rand_models: bool) -> Self {
        self.rand_models = rand_models;
        self
    }

    pub fn with_min_cores(mut self, min_cores: bool) -> Self {
        self.min_cores = min_cores;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: bool) -> Self {
        self.diagnostic = diagnostic;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }
}
