mod engine;
mod solver;
mod types;

pub use engine::{
    effective_rate, solve, solve_initial_amount, solve_periodic_amount, solve_rate_percentage,
    solve_target_amount, solve_vesting_period, sub_periods,
};
pub use solver::{RateMethod, SolverConfig, VestingMethod, solve_vesting_period_iteratively};
pub use types::{CompoundingOption, Plan, SolveError, Unknown};
