use std::fmt;

use serde::{Deserialize, Serialize};

use super::policy::WithdrawalPolicy;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    MarriedFilingJointly,
}

impl FilingStatus {
    pub const ALL: [FilingStatus; 2] = [FilingStatus::Single, FilingStatus::MarriedFilingJointly];

    pub fn as_str(self) -> &'static str {
        match self {
            FilingStatus::Single => "single",
            FilingStatus::MarriedFilingJointly => "married-filing-jointly",
        }
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalances {
    pub taxable: f64,
    pub traditional: f64,
    pub roth: f64,
    pub hsa: f64,
}

impl AccountBalances {
    pub fn total(&self) -> f64 {
        self.taxable + self.traditional + self.roth + self.hsa
    }

    pub fn spendable(&self) -> f64 {
        self.taxable + self.traditional + self.roth
    }

    pub(crate) fn clamped(self) -> Self {
        Self {
            taxable: self.taxable.max(0.0),
            traditional: self.traditional.max(0.0),
            roth: self.roth.max(0.0),
            hsa: self.hsa.max(0.0),
        }
    }

    pub(crate) fn after_withdrawal(self, withdrawal: &WithdrawalRequest) -> Self {
        Self {
            taxable: (self.taxable - withdrawal.taxable).max(0.0),
            traditional: (self.traditional - withdrawal.traditional).max(0.0),
            roth: (self.roth - withdrawal.roth).max(0.0),
            hsa: (self.hsa - withdrawal.hsa).max(0.0),
        }
    }

    pub(crate) fn grown(self, rate: f64) -> Self {
        let factor = (1.0 + rate).max(0.0);
        Self {
            taxable: self.taxable * factor,
            traditional: self.traditional * factor,
            roth: self.roth * factor,
            hsa: self.hsa * factor,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub taxable: f64,
    pub traditional: f64,
    pub roth: f64,
    pub hsa: f64,
}

impl WithdrawalRequest {
    pub fn total(&self) -> f64 {
        self.taxable + self.traditional + self.roth + self.hsa
    }

    /// Amount drawn for ordinary spending, excluding HSA medical draws.
    pub fn spending_total(&self) -> f64 {
        self.taxable + self.traditional + self.roth
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetirementProfile {
    pub current_age: u32,
    pub life_expectancy: u32,
    pub annual_spending_need: f64,
    pub social_security: f64,
    pub pension: f64,
    pub healthcare_cost_base: f64,
    pub filing_status: FilingStatus,
    pub expected_return: f64,
    pub healthcare_inflation: f64,
}

impl RetirementProfile {
    pub fn horizon_years(&self) -> u32 {
        self.life_expectancy.saturating_sub(self.current_age)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub profile: RetirementProfile,
    pub starting_balances: AccountBalances,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRecord {
    pub year_index: u32,
    pub age: u32,
    pub ending_balances: AccountBalances,
    pub withdrawals: WithdrawalRequest,
    pub tax_paid: f64,
    pub marginal_rate: f64,
    pub healthcare_need: f64,
    pub amount_needed: f64,
    pub taxable_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResult {
    pub policy: WithdrawalPolicy,
    pub year_records: Vec<YearRecord>,
    pub total_taxes_paid: f64,
    pub total_withdrawn: f64,
    pub ending_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonOutcome {
    pub results: Vec<StrategyResult>,
    pub best_index: usize,
    pub best_policy: WithdrawalPolicy,
    pub tax_savings_vs_baseline: f64,
}

impl ComparisonOutcome {
    pub fn best(&self) -> &StrategyResult {
        &self.results[self.best_index]
    }

    pub fn result_for(&self, policy: WithdrawalPolicy) -> Option<&StrategyResult> {
        self.results.iter().find(|r| r.policy == policy)
    }
}
