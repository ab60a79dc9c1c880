mod engine;
mod policy;
mod tax;
mod types;

pub use engine::{
    compare_strategies, compare_strategies_with, run_strategy, run_strategy_with, simulate_year,
};
pub use policy::{PolicyContext, WithdrawalPolicy};
pub use tax::{
    Assumptions, FilingTable, FilingTableConfig, HEALTHCARE_INFLATION, SENIOR_AGE,
    SOCIAL_SECURITY_TAXABLE_FRACTION, TARGET_BRACKET_RATE, TAXABLE_GAINS_FRACTION, TaxBracket,
    TaxSchedule, TaxScheduleConfig, TaxTableError, marginal_rate, tax_owed,
};
pub use types::{
    AccountBalances, ComparisonOutcome, FilingStatus, Inputs, RetirementProfile, StrategyResult,
    WithdrawalRequest, YearRecord,
};
