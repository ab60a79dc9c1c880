use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::FilingStatus;

pub const SOCIAL_SECURITY_TAXABLE_FRACTION: f64 = 0.85;
pub const TAXABLE_GAINS_FRACTION: f64 = 0.15;
pub const HEALTHCARE_INFLATION: f64 = 0.055;
pub const TARGET_BRACKET_RATE: f64 = 0.22;
pub const SENIOR_AGE: u32 = 65;

const RATE_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assumptions {
    pub social_security_taxable_fraction: f64,
    pub taxable_gains_fraction: f64,
    pub senior_age: u32,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            social_security_taxable_fraction: SOCIAL_SECURITY_TAXABLE_FRACTION,
            taxable_gains_fraction: TAXABLE_GAINS_FRACTION,
            senior_age: SENIOR_AGE,
        }
    }
}

impl Assumptions {
    pub fn guaranteed_taxable_income(&self, social_security: f64, pension: f64) -> f64 {
        self.social_security_taxable_fraction * social_security.max(0.0) + pension.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub lower_bound: f64,
    /// `None` marks the unbounded top bracket.
    pub upper_bound: Option<f64>,
    pub rate: f64,
}

impl TaxBracket {
    const fn bounded(lower_bound: f64, upper_bound: f64, rate: f64) -> Self {
        Self {
            lower_bound,
            upper_bound: Some(upper_bound),
            rate,
        }
    }

    const fn top(lower_bound: f64, rate: f64) -> Self {
        Self {
            lower_bound,
            upper_bound: None,
            rate,
        }
    }

    fn width(&self) -> f64 {
        match self.upper_bound {
            Some(upper) => (upper - self.lower_bound).max(0.0),
            None => f64::INFINITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum TaxTableError {
    #[error("{status}: bracket table is empty")]
    EmptyBrackets { status: FilingStatus },
    #[error("{status}: bracket {index} has a non-finite bound")]
    NonFiniteBound { status: FilingStatus, index: usize },
    #[error("{status}: first bracket must start at 0, found {lower}")]
    FirstBracketNotZero { status: FilingStatus, lower: f64 },
    #[error("{status}: bracket {index} starts at {lower} but the previous bracket ends at {expected}")]
    NotContiguous {
        status: FilingStatus,
        index: usize,
        lower: f64,
        expected: f64,
    },
    #[error("{status}: bracket {index} upper bound {upper} must be > lower bound {lower}")]
    EmptyBand {
        status: FilingStatus,
        index: usize,
        lower: f64,
        upper: f64,
    },
    #[error("{status}: only the last bracket may be unbounded (bracket {index})")]
    UnboundedNotLast { status: FilingStatus, index: usize },
    #[error("{status}: last bracket must be unbounded")]
    BoundedTop { status: FilingStatus },
    #[error("{status}: bracket {index} rate {rate} must be between 0 and 1")]
    InvalidRate {
        status: FilingStatus,
        index: usize,
        rate: f64,
    },
    #[error("{status}: bracket {index} rate {rate} is lower than the bracket below it")]
    RegressiveRate {
        status: FilingStatus,
        index: usize,
        rate: f64,
    },
    #[error("{status}: standard deduction {amount} must be finite and >= 0")]
    InvalidDeduction { status: FilingStatus, amount: f64 },
    #[error("{status}: no brackets or standard deduction configured")]
    MissingFilingStatus { status: FilingStatus },
    #[error("{status}: configured more than once")]
    DuplicateFilingStatus { status: FilingStatus },
    #[error("{status}: no bounded bracket taxed at {rate}")]
    MissingTargetBracket { status: FilingStatus, rate: f64 },
    #[error("failed to read tax table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tax table JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingTableConfig {
    pub filing_status: FilingStatus,
    pub brackets: Vec<TaxBracket>,
    pub standard_deduction: f64,
    pub standard_deduction_65_or_older: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxScheduleConfig {
    pub filing_statuses: Vec<FilingTableConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilingTable {
    brackets: Vec<TaxBracket>,
    standard_deduction: f64,
    standard_deduction_65_or_older: f64,
    target_bracket_ceiling: f64,
}

impl FilingTable {
    fn from_config(config: FilingTableConfig) -> Result<Self, TaxTableError> {
        let status = config.filing_status;
        validate_brackets(status, &config.brackets)?;

        for amount in [
            config.standard_deduction,
            config.standard_deduction_65_or_older,
        ] {
            if !amount.is_finite() || amount < 0.0 {
                return Err(TaxTableError::InvalidDeduction { status, amount });
            }
        }

        let target_bracket_ceiling = config
            .brackets
            .iter()
            .find(|b| (b.rate - TARGET_BRACKET_RATE).abs() <= RATE_EPS)
            .and_then(|b| b.upper_bound)
            .ok_or(TaxTableError::MissingTargetBracket {
                status,
                rate: TARGET_BRACKET_RATE,
            })?;

        Ok(Self {
            brackets: config.brackets,
            standard_deduction: config.standard_deduction,
            standard_deduction_65_or_older: config.standard_deduction_65_or_older,
            target_bracket_ceiling,
        })
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    pub fn standard_deduction(&self, is_65_or_older: bool) -> f64 {
        if is_65_or_older {
            self.standard_deduction_65_or_older
        } else {
            self.standard_deduction
        }
    }

    pub fn target_bracket_ceiling(&self) -> f64 {
        self.target_bracket_ceiling
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxSchedule {
    single: FilingTable,
    married_filing_jointly: FilingTable,
}

impl TaxSchedule {
    pub fn federal_2024() -> Self {
        Self {
            single: FilingTable {
                brackets: SINGLE_2024.to_vec(),
                standard_deduction: 14_600.0,
                standard_deduction_65_or_older: 16_550.0,
                target_bracket_ceiling: 100_525.0,
            },
            married_filing_jointly: FilingTable {
                brackets: MARRIED_FILING_JOINTLY_2024.to_vec(),
                standard_deduction: 29_200.0,
                standard_deduction_65_or_older: 32_600.0,
                target_bracket_ceiling: 201_050.0,
            },
        }
    }

    pub fn federal_2024_config() -> TaxScheduleConfig {
        let schedule = Self::federal_2024();
        TaxScheduleConfig {
            filing_statuses: FilingStatus::ALL
                .iter()
                .map(|&status| {
                    let table = schedule.table(status);
                    FilingTableConfig {
                        filing_status: status,
                        brackets: table.brackets.clone(),
                        standard_deduction: table.standard_deduction,
                        standard_deduction_65_or_older: table.standard_deduction_65_or_older,
                    }
                })
                .collect(),
        }
    }

    pub fn from_config(config: TaxScheduleConfig) -> Result<Self, TaxTableError> {
        let mut single = None;
        let mut married_filing_jointly = None;

        for entry in config.filing_statuses {
            let status = entry.filing_status;
            let slot = match status {
                FilingStatus::Single => &mut single,
                FilingStatus::MarriedFilingJointly => &mut married_filing_jointly,
            };
            if slot.is_some() {
                return Err(TaxTableError::DuplicateFilingStatus { status });
            }
            *slot = Some(FilingTable::from_config(entry)?);
        }

        Ok(Self {
            single: single.ok_or(TaxTableError::MissingFilingStatus {
                status: FilingStatus::Single,
            })?,
            married_filing_jointly: married_filing_jointly.ok_or(
                TaxTableError::MissingFilingStatus {
                    status: FilingStatus::MarriedFilingJointly,
                },
            )?,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, TaxTableError> {
        let config = serde_json::from_str::<TaxScheduleConfig>(json)?;
        Self::from_config(config)
    }

    pub fn load(path: &Path) -> Result<Self, TaxTableError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn table(&self, status: FilingStatus) -> &FilingTable {
        match status {
            FilingStatus::Single => &self.single,
            FilingStatus::MarriedFilingJointly => &self.married_filing_jointly,
        }
    }
}

impl Default for TaxSchedule {
    fn default() -> Self {
        Self::federal_2024()
    }
}

const SINGLE_2024: [TaxBracket; 7] = [
    TaxBracket::bounded(0.0, 11_600.0, 0.10),
    TaxBracket::bounded(11_600.0, 47_150.0, 0.12),
    TaxBracket::bounded(47_150.0, 100_525.0, 0.22),
    TaxBracket::bounded(100_525.0, 191_950.0, 0.24),
    TaxBracket::bounded(191_950.0, 243_725.0, 0.32),
    TaxBracket::bounded(243_725.0, 609_350.0, 0.35),
    TaxBracket::top(609_350.0, 0.37),
];

const MARRIED_FILING_JOINTLY_2024: [TaxBracket; 7] = [
    TaxBracket::bounded(0.0, 23_200.0, 0.10),
    TaxBracket::bounded(23_200.0, 94_300.0, 0.12),
    TaxBracket::bounded(94_300.0, 201_050.0, 0.22),
    TaxBracket::bounded(201_050.0, 383_900.0, 0.24),
    TaxBracket::bounded(383_900.0, 487_450.0, 0.32),
    TaxBracket::bounded(487_450.0, 731_200.0, 0.35),
    TaxBracket::top(731_200.0, 0.37),
];

fn validate_brackets(status: FilingStatus, brackets: &[TaxBracket]) -> Result<(), TaxTableError> {
    let Some(first) = brackets.first() else {
        return Err(TaxTableError::EmptyBrackets { status });
    };
    if first.lower_bound != 0.0 {
        return Err(TaxTableError::FirstBracketNotZero {
            status,
            lower: first.lower_bound,
        });
    }

    let last_index = brackets.len() - 1;
    let mut previous: Option<&TaxBracket> = None;

    for (index, bracket) in brackets.iter().enumerate() {
        let finite_upper = bracket.upper_bound.is_none_or(f64::is_finite);
        if !bracket.lower_bound.is_finite() || !finite_upper {
            return Err(TaxTableError::NonFiniteBound { status, index });
        }

        if !(0.0..=1.0).contains(&bracket.rate) {
            return Err(TaxTableError::InvalidRate {
                status,
                index,
                rate: bracket.rate,
            });
        }

        if let Some(prev) = previous {
            // Only the last bracket is unbounded, so `prev` always has an upper bound here.
            let expected = prev.upper_bound.unwrap_or(f64::INFINITY);
            if bracket.lower_bound != expected {
                return Err(TaxTableError::NotContiguous {
                    status,
                    index,
                    lower: bracket.lower_bound,
                    expected,
                });
            }
            if bracket.rate < prev.rate {
                return Err(TaxTableError::RegressiveRate {
                    status,
                    index,
                    rate: bracket.rate,
                });
            }
        }

        match bracket.upper_bound {
            Some(upper) => {
                if upper <= bracket.lower_bound {
                    return Err(TaxTableError::EmptyBand {
                        status,
                        index,
                        lower: bracket.lower_bound,
                        upper,
                    });
                }
                if index == last_index {
                    return Err(TaxTableError::BoundedTop { status });
                }
            }
            None => {
                if index != last_index {
                    return Err(TaxTableError::UnboundedNotLast { status, index });
                }
            }
        }

        previous = Some(bracket);
    }

    Ok(())
}

pub fn tax_owed(taxable_income: f64, brackets: &[TaxBracket]) -> f64 {
    let mut remaining = taxable_income.max(0.0);
    let mut tax = 0.0;

    for bracket in brackets {
        if remaining <= 0.0 {
            break;
        }
        let taxed = remaining.min(bracket.width());
        tax += taxed * bracket.rate;
        remaining -= taxed;
    }

    tax
}

/// Rate of the first bracket whose upper bound is at or above `taxable_income`.
pub fn marginal_rate(taxable_income: f64, brackets: &[TaxBracket]) -> f64 {
    brackets
        .iter()
        .find(|b| b.upper_bound.is_none_or(|upper| upper >= taxable_income))
        .or_else(|| brackets.last())
        .map_or(0.0, |b| b.rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn single_brackets() -> Vec<TaxBracket> {
        TaxSchedule::federal_2024()
            .table(FilingStatus::Single)
            .brackets()
            .to_vec()
    }

    fn single_config() -> FilingTableConfig {
        TaxSchedule::federal_2024_config()
            .filing_statuses
            .into_iter()
            .find(|t| t.filing_status == FilingStatus::Single)
            .expect("single table present")
    }

    fn schedule_with_single(single: FilingTableConfig) -> TaxScheduleConfig {
        let mut config = TaxSchedule::federal_2024_config();
        config
            .filing_statuses
            .retain(|t| t.filing_status != FilingStatus::Single);
        config.filing_statuses.push(single);
        config
    }

    #[test]
    fn tax_owed_on_fifty_thousand_single() {
        // 11,600 at 10% + 35,550 at 12% + 2,850 at 22%
        let tax = tax_owed(50_000.0, &single_brackets());
        assert_approx(tax, 1_160.0 + 4_266.0 + 627.0);
    }

    #[test]
    fn tax_owed_is_zero_for_zero_and_negative_income() {
        let brackets = single_brackets();
        assert_approx(tax_owed(0.0, &brackets), 0.0);
        assert_approx(tax_owed(-25_000.0, &brackets), 0.0);
        assert_approx(tax_owed(f64::NAN, &brackets), 0.0);
    }

    #[test]
    fn tax_owed_reaches_top_bracket() {
        let brackets = single_brackets();
        let at_top = tax_owed(609_350.0, &brackets);
        let above = tax_owed(709_350.0, &brackets);
        assert_approx(above - at_top, 37_000.0);
    }

    #[test]
    fn marginal_rate_uses_inclusive_upper_bound() {
        let brackets = single_brackets();
        assert_approx(marginal_rate(0.0, &brackets), 0.10);
        assert_approx(marginal_rate(11_600.0, &brackets), 0.10);
        assert_approx(marginal_rate(11_600.01, &brackets), 0.12);
        assert_approx(marginal_rate(50_000.0, &brackets), 0.22);
        assert_approx(marginal_rate(5_000_000.0, &brackets), 0.37);
    }

    #[test]
    fn marginal_rate_of_empty_table_is_zero() {
        assert_approx(marginal_rate(10_000.0, &[]), 0.0);
    }

    #[test]
    fn standard_deduction_depends_on_status_and_age() {
        let schedule = TaxSchedule::federal_2024();
        let single = schedule.table(FilingStatus::Single);
        let joint = schedule.table(FilingStatus::MarriedFilingJointly);
        assert_approx(single.standard_deduction(false), 14_600.0);
        assert_approx(single.standard_deduction(true), 16_550.0);
        assert_approx(joint.standard_deduction(false), 29_200.0);
        assert_approx(joint.standard_deduction(true), 32_600.0);
    }

    #[test]
    fn target_bracket_ceiling_is_top_of_22_percent_band() {
        let schedule = TaxSchedule::federal_2024();
        assert_approx(
            schedule.table(FilingStatus::Single).target_bracket_ceiling(),
            100_525.0,
        );
        assert_approx(
            schedule
                .table(FilingStatus::MarriedFilingJointly)
                .target_bracket_ceiling(),
            201_050.0,
        );
    }

    #[test]
    fn federal_config_round_trips_through_validation() {
        let rebuilt = TaxSchedule::from_config(TaxSchedule::federal_2024_config())
            .expect("built-in schedule is valid");
        assert_eq!(rebuilt, TaxSchedule::federal_2024());
    }

    #[test]
    fn bundled_json_matches_built_in_schedule() {
        let json = include_str!("../../data/federal_2024.json");
        let loaded = TaxSchedule::from_json(json).expect("bundled table is valid");
        assert_eq!(loaded, TaxSchedule::federal_2024());
    }

    #[test]
    fn rejects_gap_between_brackets() {
        let mut single = single_config();
        single.brackets[2].lower_bound = 48_000.0;
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("gap must be rejected");
        assert!(matches!(
            err,
            TaxTableError::NotContiguous { index: 2, .. }
        ));
    }

    #[test]
    fn rejects_bounded_top_bracket() {
        let mut single = single_config();
        if let Some(last) = single.brackets.last_mut() {
            last.upper_bound = Some(1_000_000.0);
        }
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("bounded top must be rejected");
        assert!(matches!(err, TaxTableError::BoundedTop { .. }));
    }

    #[test]
    fn rejects_unbounded_bracket_before_the_last() {
        let mut single = single_config();
        single.brackets[1].upper_bound = None;
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("unbounded middle bracket must be rejected");
        assert!(matches!(
            err,
            TaxTableError::UnboundedNotLast { index: 1, .. }
        ));
    }

    #[test]
    fn rejects_unsorted_brackets() {
        let mut single = single_config();
        single.brackets.swap(1, 2);
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("unsorted table must be rejected");
        assert!(matches!(err, TaxTableError::NotContiguous { .. }));
    }

    #[test]
    fn rejects_first_bracket_above_zero() {
        let mut single = single_config();
        single.brackets.remove(0);
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("table must start at zero");
        assert!(matches!(err, TaxTableError::FirstBracketNotZero { .. }));
    }

    #[test]
    fn rejects_rate_outside_unit_interval_and_regressive_rates() {
        let mut single = single_config();
        single.brackets[0].rate = 1.5;
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("rate above 1 must be rejected");
        assert!(matches!(err, TaxTableError::InvalidRate { index: 0, .. }));

        let mut single = single_config();
        single.brackets[4].rate = 0.20;
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("falling rate must be rejected");
        assert!(matches!(err, TaxTableError::RegressiveRate { index: 4, .. }));
    }

    #[test]
    fn rejects_missing_and_duplicate_filing_status() {
        let mut config = TaxSchedule::federal_2024_config();
        config
            .filing_statuses
            .retain(|t| t.filing_status != FilingStatus::MarriedFilingJointly);
        let err = TaxSchedule::from_config(config).expect_err("missing status");
        assert!(matches!(
            err,
            TaxTableError::MissingFilingStatus {
                status: FilingStatus::MarriedFilingJointly
            }
        ));

        let mut config = TaxSchedule::federal_2024_config();
        config.filing_statuses.push(single_config());
        let err = TaxSchedule::from_config(config).expect_err("duplicate status");
        assert!(matches!(err, TaxTableError::DuplicateFilingStatus { .. }));
    }

    #[test]
    fn rejects_negative_deduction_and_missing_target_bracket() {
        let mut single = single_config();
        single.standard_deduction_65_or_older = -1.0;
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("negative deduction must be rejected");
        assert!(matches!(err, TaxTableError::InvalidDeduction { .. }));

        let mut single = single_config();
        single.brackets[2].rate = 0.23;
        let err = TaxSchedule::from_config(schedule_with_single(single))
            .expect_err("table without a 22% band must be rejected");
        assert!(matches!(err, TaxTableError::MissingTargetBracket { .. }));
    }

    #[test]
    fn from_json_reports_parse_errors() {
        let err = TaxSchedule::from_json("{\"filingStatuses\": 3}").expect_err("bad json");
        assert!(matches!(err, TaxTableError::Parse(_)));
        assert!(err.to_string().starts_with("invalid tax table JSON"));
    }

    #[test]
    fn guaranteed_taxable_income_counts_85_percent_of_social_security() {
        let assumptions = Assumptions::default();
        assert_approx(
            assumptions.guaranteed_taxable_income(24_000.0, 10_000.0),
            20_400.0 + 10_000.0,
        );
        assert_approx(assumptions.guaranteed_taxable_income(-5.0, -5.0), 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_tax_and_marginal_rate_are_monotone(
            low in 0u32..1_000_000,
            delta in 0u32..500_000,
            joint in proptest::bool::ANY
        ) {
            let status = if joint {
                FilingStatus::MarriedFilingJointly
            } else {
                FilingStatus::Single
            };
            let schedule = TaxSchedule::federal_2024();
            let brackets = schedule.table(status).brackets();
            let a = low as f64;
            let b = a + delta as f64;

            prop_assert!(tax_owed(a, brackets) <= tax_owed(b, brackets) + 1e-9);
            prop_assert!(marginal_rate(a, brackets) <= marginal_rate(b, brackets));
            prop_assert!(tax_owed(b, brackets) <= b * 0.37 + 1e-6);
        }
    }
}
