use tracing::debug;

use super::engine::{effective_rate, per_period_installment, project};
use super::types::{CompoundingOption, Plan, SolveError, Unknown};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RateMethod {
    /// Root-finding on `projected(rate) - target` within `[search_min, search_max]`.
    Bisection,
    /// Scan upward from 0% in `rate_step` increments, stopping at the first
    /// rate whose projection reaches the target. Precision is bounded by the
    /// step and negative rates are never tried.
    LinearStep,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VestingMethod {
    ClosedForm,
    /// Period-by-period accumulation; answers in whole sub-periods.
    Iterative,
}

#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    pub rate_method: RateMethod,
    pub vesting_method: VestingMethod,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub rate_step: f64,
    pub max_iterations: u32,
    pub max_periods: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rate_method: RateMethod::Bisection,
            vesting_method: VestingMethod::ClosedForm,
            search_min: -100.0,
            search_max: 1_000.0,
            tolerance: 1e-10,
            rate_step: 0.1,
            max_iterations: 10_000,
            max_periods: 120_000,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.search_min.is_finite() || !self.search_max.is_finite() {
            return Err("search bounds must be finite".to_string());
        }
        if self.search_max <= self.search_min {
            return Err("search_max must be greater than search_min".to_string());
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err("tolerance must be > 0".to_string());
        }
        if !self.rate_step.is_finite() || self.rate_step <= 0.0 {
            return Err("rate_step must be > 0".to_string());
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be > 0".to_string());
        }
        if self.max_periods == 0 {
            return Err("max_periods must be > 0".to_string());
        }
        Ok(())
    }
}

pub(crate) fn search_rate_percentage(
    plan: &Plan,
    option: CompoundingOption,
    config: &SolverConfig,
) -> Result<f64, SolveError> {
    match config.rate_method {
        RateMethod::Bisection => bisect_rate(plan, option, config),
        RateMethod::LinearStep => step_rate(plan, option, config),
    }
}

fn projection_gap(plan: &Plan, option: CompoundingOption, rate: f64) -> f64 {
    project(&plan.with_rate_percentage(rate), option) - plan.target_amount()
}

/// Narrows the configured bounds to rates with a non-negative effective
/// rate, where the projection is monotone.
fn rate_bracket(plan: &Plan, option: CompoundingOption, config: &SolverConfig) -> (f64, f64) {
    let factor = option.factor() as f64;
    let after_tax = plan.after_tax_factor();
    let floor = (plan.inflation_percentage() - 100.0 * factor) / after_tax;
    if after_tax > 0.0 {
        (config.search_min.max(floor), config.search_max)
    } else {
        (config.search_min, config.search_max.min(floor))
    }
}

fn bisect_rate(
    plan: &Plan,
    option: CompoundingOption,
    config: &SolverConfig,
) -> Result<f64, SolveError> {
    let target = plan.target_amount();
    let (mut lo, mut hi) = rate_bracket(plan, option, config);
    if hi <= lo {
        return Err(SolveError::Unreachable {
            target,
            reason: "no rate within the search bounds keeps the effective rate positive",
        });
    }

    let mut gap_lo = projection_gap(plan, option, lo);
    let gap_hi = projection_gap(plan, option, hi);
    if gap_lo.is_nan() || gap_hi.is_nan() {
        return Err(SolveError::Undefined {
            unknown: Unknown::RatePercentage,
            reason: "projection is not a number at the search bounds",
        });
    }
    if gap_lo == 0.0 {
        return Ok(lo);
    }
    if gap_hi == 0.0 {
        return Ok(hi);
    }
    if gap_lo.signum() == gap_hi.signum() {
        return Err(SolveError::Unreachable {
            target,
            reason: "no rate within the search bounds reaches the target",
        });
    }

    for iteration in 1..=config.max_iterations {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            return Ok(mid);
        }
        let gap_mid = projection_gap(plan, option, mid);
        debug!(iteration, lo, hi, mid, gap_mid, "rate bisection step");
        if gap_mid.is_nan() {
            return Err(SolveError::Undefined {
                unknown: Unknown::RatePercentage,
                reason: "projection is not a number inside the search bounds",
            });
        }
        if gap_mid == 0.0 {
            return Ok(mid);
        }

        if gap_mid.signum() == gap_lo.signum() {
            lo = mid;
            gap_lo = gap_mid;
        } else {
            hi = mid;
        }

        if (hi - lo).abs() <= config.tolerance {
            return Ok(0.5 * (lo + hi));
        }
    }

    Err(SolveError::SearchExhausted {
        unknown: Unknown::RatePercentage,
        iterations: config.max_iterations,
    })
}

fn step_rate(
    plan: &Plan,
    option: CompoundingOption,
    config: &SolverConfig,
) -> Result<f64, SolveError> {
    let target = plan.target_amount();
    for step in 0..config.max_iterations {
        let rate = step as f64 * config.rate_step;
        let projected = project(&plan.with_rate_percentage(rate), option);
        if projected.is_nan() {
            return Err(SolveError::Undefined {
                unknown: Unknown::RatePercentage,
                reason: "projection is not a number",
            });
        }
        if projected >= target {
            debug!(step, rate, projected, "rate step search reached target");
            return Ok(rate);
        }
    }

    Err(SolveError::SearchExhausted {
        unknown: Unknown::RatePercentage,
        iterations: config.max_iterations,
    })
}

/// Vesting period found by accumulating one sub-period at a time until the
/// balance reaches the target. The result is a whole number of sub-periods
/// expressed in years.
pub fn solve_vesting_period_iteratively(
    plan: &Plan,
    option: CompoundingOption,
    config: &SolverConfig,
) -> Result<f64, SolveError> {
    let factor = option.factor();
    let rate = effective_rate(plan, option);
    let installment = per_period_installment(plan, option);
    let target = plan.target_amount();

    let mut compound = plan.initial_amount();
    let mut accumulation = 0.0;
    if target < compound {
        return Err(SolveError::Unreachable {
            target,
            reason: "the initial amount already exceeds the target",
        });
    }
    if target > compound && rate <= 1.0 && installment <= 0.0 {
        return Err(SolveError::Unreachable {
            target,
            reason: "the plan does not grow and receives no installments",
        });
    }

    let mut periods: u32 = 0;
    while target > compound + accumulation {
        if periods >= config.max_periods {
            return Err(SolveError::SearchExhausted {
                unknown: Unknown::VestingPeriod,
                iterations: config.max_periods,
            });
        }
        compound *= rate;
        accumulation = accumulation * rate + installment;
        periods += 1;
    }

    debug!(periods, factor, "iterative vesting search reached target");
    Ok(periods as f64 / factor as f64)
}
