/// Options steering a single analysis run.
///
/// Time budgets of zero mean "unlimited". The two compile-time switches of
/// the engine (the final asymptotic check and parallel-rule pruning) are
/// cargo features, not fields here.
#[derive(Clone, Debug)]
pub struct AnalysisSettings {
    /// Rule-level simplification before the main fixpoint.
    pub do_preprocessing: bool,
    /// Allow stripping an implied trailing cost constraint from guards.
    pub eliminate_cost_constraints: bool,
    /// Render the fully simplified problem in the input dialect.
    pub print_simplified_as_input_format: bool,
    /// Collect a stepwise dot trace of the transformation.
    pub dot_output: bool,
    /// Upper bound on parallel rules kept between a pair of locations.
    pub max_parallel: usize,
    /// Fan-out budget for tree-shaped chaining.
    pub max_chain_fanout: usize,
    /// Cap on instantiation candidates per temporary during metering.
    pub freevar_instantiate_maxbounds: usize,
    /// Soft budget: stop improving, finalize with what is there.
    pub soft_timeout_secs: u64,
    /// Hard budget: stop now, report the current best.
    pub hard_timeout_secs: u64,
    /// Collect SMT-LIB dumps of the metering queries.
    pub dump_smt: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            do_preprocessing: true,
            eliminate_cost_constraints: true,
            print_simplified_as_input_format: false,
            dot_output: false,
            max_parallel: 5,
            max_chain_fanout: 16,
            freevar_instantiate_maxbounds: 4,
            soft_timeout_secs: 0,
            hard_timeout_secs: 0,
            dump_smt: false,
        }
    }
}
