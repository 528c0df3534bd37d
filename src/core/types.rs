use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompoundingOption {
    Monthly,
    Quarterly,
    Annually,
}

impl CompoundingOption {
    /// Sub-periods per year.
    pub fn factor(self) -> u32 {
        match self {
            CompoundingOption::Annually => 1,
            CompoundingOption::Quarterly => 4,
            CompoundingOption::Monthly => 12,
        }
    }
}

/// The plan quantity a solve isolates.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Unknown {
    TargetAmount,
    PeriodicAmount,
    InitialAmount,
    VestingPeriod,
    RatePercentage,
}

impl fmt::Display for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Unknown::TargetAmount => "target amount",
            Unknown::PeriodicAmount => "periodic amount",
            Unknown::InitialAmount => "initial amount",
            Unknown::VestingPeriod => "vesting period",
            Unknown::RatePercentage => "rate percentage",
        };
        f.write_str(name)
    }
}

/// A periodic-investment plan.
///
/// `periodic_amount` is the yearly installment; it is spread evenly over the
/// sub-periods of whichever compounding option a solve uses. Percentages are
/// annual and may be negative.
///
/// A `Plan` is never mutated by the solver. Solves that need a variant of the
/// plan (zero installment, trial rate, ...) derive a new value through the
/// `with_*` methods.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Plan {
    initial_amount: f64,
    periodic_amount: f64,
    target_amount: f64,
    rate_percentage: f64,
    inflation_percentage: f64,
    tax_rate_percentage: f64,
    vesting_period: u32,
}

impl Plan {
    pub fn new(
        initial_amount: f64,
        periodic_amount: f64,
        target_amount: f64,
        rate_percentage: f64,
        vesting_period: u32,
    ) -> Self {
        Self {
            initial_amount,
            periodic_amount,
            target_amount,
            rate_percentage,
            inflation_percentage: 0.0,
            tax_rate_percentage: 0.0,
            vesting_period,
        }
    }

    pub fn initial_amount(&self) -> f64 {
        self.initial_amount
    }

    pub fn periodic_amount(&self) -> f64 {
        self.periodic_amount
    }

    pub fn target_amount(&self) -> f64 {
        self.target_amount
    }

    pub fn rate_percentage(&self) -> f64 {
        self.rate_percentage
    }

    pub fn inflation_percentage(&self) -> f64 {
        self.inflation_percentage
    }

    pub fn tax_rate_percentage(&self) -> f64 {
        self.tax_rate_percentage
    }

    /// Years the plan runs.
    pub fn vesting_period(&self) -> u32 {
        self.vesting_period
    }

    pub fn with_initial_amount(self, initial_amount: f64) -> Self {
        Self {
            initial_amount,
            ..self
        }
    }

    pub fn with_periodic_amount(self, periodic_amount: f64) -> Self {
        Self {
            periodic_amount,
            ..self
        }
    }

    pub fn with_target_amount(self, target_amount: f64) -> Self {
        Self {
            target_amount,
            ..self
        }
    }

    pub fn with_rate_percentage(self, rate_percentage: f64) -> Self {
        Self {
            rate_percentage,
            ..self
        }
    }

    pub fn with_inflation_percentage(self, inflation_percentage: f64) -> Self {
        Self {
            inflation_percentage,
            ..self
        }
    }

    pub fn with_tax_rate_percentage(self, tax_rate_percentage: f64) -> Self {
        Self {
            tax_rate_percentage,
            ..self
        }
    }

    pub fn with_vesting_period(self, vesting_period: u32) -> Self {
        Self {
            vesting_period,
            ..self
        }
    }

    /// Fraction of nominal interest kept after tax.
    pub fn after_tax_factor(&self) -> f64 {
        (100.0 - self.tax_rate_percentage) / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// The algebra has no value here: a zero divisor, a log or root of a
    /// non-positive number, or a non-finite result.
    #[error("{unknown} is undefined: {reason}")]
    Undefined {
        unknown: Unknown,
        reason: &'static str,
    },

    #[error("target amount {target} is unreachable: {reason}")]
    Unreachable { target: f64, reason: &'static str },

    #[error("{unknown} search did not converge within {iterations} iterations")]
    SearchExhausted { unknown: Unknown, iterations: u32 },
}

impl SolveError {
    /// Short machine-readable tag used by the API layer.
    pub fn kind(&self) -> &'static str {
        match self {
            SolveError::Undefined { .. } => "undefined",
            SolveError::Unreachable { .. } => "unreachable",
            SolveError::SearchExhausted { .. } => "search-exhausted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_matches_sub_periods_per_year() {
        assert_eq!(CompoundingOption::Annually.factor(), 1);
        assert_eq!(CompoundingOption::Quarterly.factor(), 4);
        assert_eq!(CompoundingOption::Monthly.factor(), 12);
    }

    #[test]
    fn new_plan_defaults_inflation_and_tax_to_zero() {
        let plan = Plan::new(1_000.0, 100.0, 5_000.0, 7.0, 10);
        assert_eq!(plan.inflation_percentage(), 0.0);
        assert_eq!(plan.tax_rate_percentage(), 0.0);
        assert_eq!(plan.after_tax_factor(), 1.0);
    }

    #[test]
    fn overrides_leave_original_plan_untouched() {
        let plan = Plan::new(1_000.0, 100.0, 5_000.0, 7.0, 10)
            .with_inflation_percentage(2.0)
            .with_tax_rate_percentage(25.0);
        let zeroed = plan.with_periodic_amount(0.0);

        assert_eq!(plan.periodic_amount(), 100.0);
        assert_eq!(zeroed.periodic_amount(), 0.0);
        assert_eq!(zeroed.initial_amount(), plan.initial_amount());
        assert_eq!(zeroed.inflation_percentage(), 2.0);
        assert_eq!(zeroed.tax_rate_percentage(), 25.0);
        assert_eq!(zeroed.vesting_period(), 10);
        assert!((plan.after_tax_factor() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn errors_render_with_kind_and_message() {
        let err = SolveError::SearchExhausted {
            unknown: Unknown::RatePercentage,
            iterations: 12,
        };
        assert_eq!(err.kind(), "search-exhausted");
        assert_eq!(
            err.to_string(),
            "rate percentage search did not converge within 12 iterations"
        );

        let err = SolveError::Unreachable {
            target: 100.0,
            reason: "no growth",
        };
        assert_eq!(err.kind(), "unreachable");
        assert_eq!(err.to_string(), "target amount 100 is unreachable: no growth");
    }
}
