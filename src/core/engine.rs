use super::solver::{self, SolverConfig, VestingMethod};
use super::types::{CompoundingOption, Plan, SolveError, Unknown};

/// One sub-period's net growth factor: taxed nominal interest minus
/// inflation, combined additively within the sub-period.
pub fn effective_rate(plan: &Plan, option: CompoundingOption) -> f64 {
    let factor = option.factor() as f64;
    let per_period_rate = plan.rate_percentage() / factor;
    let per_period_inflation = plan.inflation_percentage() / factor;
    1.0 + per_period_rate * plan.after_tax_factor() / 100.0 - per_period_inflation / 100.0
}

/// Total number of compounding sub-periods over the vesting period.
pub fn sub_periods(plan: &Plan, option: CompoundingOption) -> u64 {
    plan.vesting_period() as u64 * option.factor() as u64
}

pub(crate) fn per_period_installment(plan: &Plan, option: CompoundingOption) -> f64 {
    plan.periodic_amount() / option.factor() as f64
}

/// `(rate^periods - 1) / (rate - 1)`, the future value of one unit paid at
/// the end of each sub-period. Collapses to `periods` at a unit rate.
fn annuity_gain(rate: f64, periods: f64) -> f64 {
    if rate == 1.0 {
        return periods;
    }
    let excess = rate - 1.0;
    let grown = if rate > 0.0 {
        (periods * excess.ln_1p()).exp_m1()
    } else {
        rate.powf(periods) - 1.0
    };
    grown / excess
}

/// Lump-sum growth plus annuity, unchecked.
pub(crate) fn project(plan: &Plan, option: CompoundingOption) -> f64 {
    let rate = effective_rate(plan, option);
    let periods = sub_periods(plan, option) as f64;
    let compound = plan.initial_amount() * rate.powf(periods);
    let annuity = if rate == 1.0 {
        // p / factor * vesting * factor, kept exact for the no-growth case.
        plan.periodic_amount() * plan.vesting_period() as f64
    } else {
        per_period_installment(plan, option) * annuity_gain(rate, periods)
    };
    compound + annuity
}

fn finite(value: f64, unknown: Unknown) -> Result<f64, SolveError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SolveError::Undefined {
            unknown,
            reason: "result is not a finite number",
        })
    }
}

pub fn solve_target_amount(plan: &Plan, option: CompoundingOption) -> Result<f64, SolveError> {
    finite(project(plan, option), Unknown::TargetAmount)
}

pub fn solve_periodic_amount(plan: &Plan, option: CompoundingOption) -> Result<f64, SolveError> {
    let factor = option.factor() as f64;
    let rate = effective_rate(plan, option);
    let periods = sub_periods(plan, option) as f64;

    let compound = project(&plan.with_periodic_amount(0.0), option);
    let gain = annuity_gain(rate, periods);
    if gain == 0.0 {
        return Err(SolveError::Undefined {
            unknown: Unknown::PeriodicAmount,
            reason: "installments never accumulate over the vesting period",
        });
    }

    finite(
        (plan.target_amount() - compound) / gain * factor,
        Unknown::PeriodicAmount,
    )
}

pub fn solve_initial_amount(plan: &Plan, option: CompoundingOption) -> Result<f64, SolveError> {
    let rate = effective_rate(plan, option);
    let periods = sub_periods(plan, option) as f64;

    let annuity = project(&plan.with_initial_amount(0.0), option);
    let growth = rate.powf(periods);
    if growth == 0.0 {
        return Err(SolveError::Undefined {
            unknown: Unknown::InitialAmount,
            reason: "the initial amount does not survive to the end of the plan",
        });
    }

    finite(
        (plan.target_amount() - annuity) / growth,
        Unknown::InitialAmount,
    )
}

/// Years until the balance first reaches the target, fractional years
/// allowed. Closed-form inverse of the growth-plus-annuity equation.
pub fn solve_vesting_period(plan: &Plan, option: CompoundingOption) -> Result<f64, SolveError> {
    let factor = option.factor() as f64;
    let rate = effective_rate(plan, option);
    let installment = per_period_installment(plan, option);
    let initial = plan.initial_amount();
    let target = plan.target_amount();

    if target == initial {
        return Ok(0.0);
    }
    if target < initial {
        return Err(SolveError::Unreachable {
            target,
            reason: "the initial amount already exceeds the target",
        });
    }
    if rate <= 0.0 {
        return Err(SolveError::Undefined {
            unknown: Unknown::VestingPeriod,
            reason: "effective rate is not positive",
        });
    }

    let periods = if rate == 1.0 {
        if installment <= 0.0 {
            return Err(SolveError::Unreachable {
                target,
                reason: "the plan neither grows nor receives installments",
            });
        }
        (target - initial) / installment
    } else {
        if rate < 1.0 && installment <= 0.0 {
            return Err(SolveError::Unreachable {
                target,
                reason: "the plan shrinks and receives no installments",
            });
        }
        let excess = rate - 1.0;
        let start = initial * excess + installment;
        let goal = target * excess + installment;
        if start <= 0.0 || goal <= 0.0 {
            return Err(SolveError::Unreachable {
                target,
                reason: "the balance never climbs to the target",
            });
        }
        // ln(goal / start) / ln(rate), in ln_1p form for rates near one.
        ((goal - start) / start).ln_1p() / excess.ln_1p()
    };

    finite(periods / factor, Unknown::VestingPeriod)
}

/// Nominal pre-tax annual rate, in percent, that carries the plan to its
/// target.
///
/// With installments the relation is transcendental in the rate, so the
/// configured search runs; without them the growth factor has a closed
/// form. A plan with zero vesting period reports zero.
pub fn solve_rate_percentage(
    plan: &Plan,
    option: CompoundingOption,
    config: &SolverConfig,
) -> Result<f64, SolveError> {
    if plan.vesting_period() == 0 {
        return Ok(0.0);
    }

    let after_tax = plan.after_tax_factor();
    if after_tax == 0.0 {
        return Err(SolveError::Undefined {
            unknown: Unknown::RatePercentage,
            reason: "all interest is taxed away so the rate has no effect",
        });
    }

    if plan.periodic_amount() != 0.0 {
        return solver::search_rate_percentage(plan, option, config);
    }

    if plan.initial_amount() == 0.0 {
        return Err(SolveError::Undefined {
            unknown: Unknown::RatePercentage,
            reason: "the plan has neither an initial amount nor installments",
        });
    }

    let ratio = plan.target_amount() / plan.initial_amount();
    if ratio <= 0.0 {
        return Err(SolveError::Undefined {
            unknown: Unknown::RatePercentage,
            reason: "target and initial amount differ in sign",
        });
    }

    let factor = option.factor() as f64;
    let periods = sub_periods(plan, option) as f64;
    let rate = ratio.powf(1.0 / periods);
    let taxed_rate = (rate - 1.0) * 100.0 * factor + plan.inflation_percentage();

    finite(taxed_rate / after_tax, Unknown::RatePercentage)
}

/// Solves the plan for `unknown`. The plan's own value for that field is
/// ignored.
pub fn solve(
    plan: &Plan,
    unknown: Unknown,
    option: CompoundingOption,
    config: &SolverConfig,
) -> Result<f64, SolveError> {
    match unknown {
        Unknown::TargetAmount => solve_target_amount(plan, option),
        Unknown::PeriodicAmount => solve_periodic_amount(plan, option),
        Unknown::InitialAmount => solve_initial_amount(plan, option),
        Unknown::VestingPeriod => match config.vesting_method {
            VestingMethod::ClosedForm => solve_vesting_period(plan, option),
            VestingMethod::Iterative => {
                solver::solve_vesting_period_iteratively(plan, option, config)
            }
        },
        Unknown::RatePercentage => solve_rate_percentage(plan, option, config),
    }
}
