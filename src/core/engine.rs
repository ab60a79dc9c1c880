use tracing::{debug, warn};

use super::policy::{PolicyContext, WithdrawalPolicy};
use super::tax::{Assumptions, FilingTable, TaxSchedule, marginal_rate, tax_owed};
use super::types::{
    AccountBalances, ComparisonOutcome, Inputs, RetirementProfile, StrategyResult,
    WithdrawalRequest, YearRecord,
};

const SHORTFALL_TOLERANCE: f64 = 1e-6;

pub fn compare_strategies(inputs: &Inputs, schedule: &TaxSchedule) -> ComparisonOutcome {
    compare_strategies_with(inputs, schedule, &Assumptions::default())
}

pub fn compare_strategies_with(
    inputs: &Inputs,
    schedule: &TaxSchedule,
    assumptions: &Assumptions,
) -> ComparisonOutcome {
    let results: Vec<StrategyResult> = WithdrawalPolicy::ALL
        .iter()
        .map(|&policy| run_strategy_with(inputs, schedule, assumptions, policy))
        .collect();

    let best_index = lowest_tax_index(&results);
    let best = &results[best_index];
    let baseline_tax = results
        .iter()
        .find(|r| r.policy == WithdrawalPolicy::BASELINE)
        .map_or(best.total_taxes_paid, |r| r.total_taxes_paid);

    debug!(
        best = best.policy.name(),
        total_taxes_paid = best.total_taxes_paid,
        baseline_tax,
        "strategy comparison complete"
    );

    ComparisonOutcome {
        best_policy: best.policy,
        tax_savings_vs_baseline: (baseline_tax - best.total_taxes_paid).max(0.0),
        best_index,
        results,
    }
}

pub fn run_strategy(
    inputs: &Inputs,
    schedule: &TaxSchedule,
    policy: WithdrawalPolicy,
) -> StrategyResult {
    run_strategy_with(inputs, schedule, &Assumptions::default(), policy)
}

pub fn run_strategy_with(
    inputs: &Inputs,
    schedule: &TaxSchedule,
    assumptions: &Assumptions,
    policy: WithdrawalPolicy,
) -> StrategyResult {
    let profile = &inputs.profile;
    let table = schedule.table(profile.filing_status);
    let horizon = profile.horizon_years();

    let mut year_records = Vec::with_capacity(horizon as usize);
    let mut total_taxes_paid = 0.0;
    let mut total_withdrawn = 0.0;

    let ending = (0..horizon).fold(inputs.starting_balances.clamped(), |balances, year_index| {
        let record = simulate_year(profile, table, assumptions, policy, year_index, balances);
        total_taxes_paid += record.tax_paid;
        total_withdrawn += record.withdrawals.total();
        let next = record.ending_balances;
        year_records.push(record);
        next
    });

    if let Some(age) = first_unmet_age(&year_records) {
        warn!(
            policy = policy.name(),
            age, "spending need not covered by remaining balances"
        );
    }

    debug!(
        policy = policy.name(),
        years = year_records.len(),
        total_taxes_paid,
        ending_balance = ending.total(),
        "strategy run complete"
    );

    StrategyResult {
        policy,
        year_records,
        total_taxes_paid,
        total_withdrawn,
        ending_balance: ending.total(),
    }
}

/// The record's ending balances are the next year's starting balances.
pub fn simulate_year(
    profile: &RetirementProfile,
    table: &FilingTable,
    assumptions: &Assumptions,
    policy: WithdrawalPolicy,
    year_index: u32,
    balances: AccountBalances,
) -> YearRecord {
    let age = profile.current_age + year_index;
    let balances = balances.clamped();

    let healthcare_need = healthcare_need(profile, year_index);
    let hsa = balances.hsa.min(healthcare_need);

    let social_security = profile.social_security.max(0.0);
    let pension = profile.pension.max(0.0);
    let amount_needed = (profile.annual_spending_need - social_security - pension).max(0.0);

    let standard_deduction = table.standard_deduction(age >= assumptions.senior_age);
    let guaranteed_taxable_income = assumptions.guaranteed_taxable_income(social_security, pension);
    let context = PolicyContext {
        guaranteed_taxable_income,
        target_bracket_ceiling: table.target_bracket_ceiling(),
        standard_deduction,
    };

    let withdrawals = WithdrawalRequest {
        hsa,
        ..policy.decide(&balances, amount_needed, &context)
    };

    let taxable_income = (guaranteed_taxable_income
        + withdrawals.traditional
        + assumptions.taxable_gains_fraction * withdrawals.taxable
        - standard_deduction)
        .max(0.0);
    let tax_paid = tax_owed(taxable_income, table.brackets());

    let ending_balances = balances
        .after_withdrawal(&withdrawals)
        .grown(profile.expected_return);

    YearRecord {
        year_index,
        age,
        ending_balances,
        withdrawals,
        tax_paid,
        marginal_rate: marginal_rate(taxable_income, table.brackets()),
        healthcare_need,
        amount_needed,
        taxable_income,
    }
}

fn healthcare_need(profile: &RetirementProfile, year_index: u32) -> f64 {
    let base = profile.healthcare_cost_base.max(0.0);
    let growth = (1.0 + profile.healthcare_inflation).max(0.0);
    base * growth.powi(year_index as i32)
}

fn first_unmet_age(records: &[YearRecord]) -> Option<u32> {
    records
        .iter()
        .find(|r| r.amount_needed - r.withdrawals.spending_total() > SHORTFALL_TOLERANCE)
        .map(|r| r.age)
}

fn lowest_tax_index(results: &[StrategyResult]) -> usize {
    let mut best = 0;
    for (index, result) in results.iter().enumerate().skip(1) {
        if result.total_taxes_paid < results[best].total_taxes_paid {
            best = index;
        }
    }
    best
}
