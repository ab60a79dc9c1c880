use serde::{Deserialize, Serialize};

use super::types::{AccountBalances, WithdrawalRequest};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalPolicy {
    TaxOptimized,
    TraditionalFirst,
    RothFirst,
    Proportional,
}

impl WithdrawalPolicy {
    pub const ALL: [WithdrawalPolicy; 4] = [
        WithdrawalPolicy::TaxOptimized,
        WithdrawalPolicy::TraditionalFirst,
        WithdrawalPolicy::RothFirst,
        WithdrawalPolicy::Proportional,
    ];

    pub const BASELINE: WithdrawalPolicy = WithdrawalPolicy::RothFirst;

    pub fn name(self) -> &'static str {
        match self {
            WithdrawalPolicy::TaxOptimized => "tax-optimized",
            WithdrawalPolicy::TraditionalFirst => "traditional-first",
            WithdrawalPolicy::RothFirst => "roth-first",
            WithdrawalPolicy::Proportional => "proportional",
        }
    }

    /// Never draws more than an account holds. The HSA field is always zero;
    /// medical draws happen before a policy runs.
    pub fn decide(
        self,
        balances: &AccountBalances,
        amount_needed: f64,
        context: &PolicyContext,
    ) -> WithdrawalRequest {
        let mut drawdown = Drawdown::new(balances, amount_needed);
        if drawdown.remaining <= 0.0 {
            return WithdrawalRequest::default();
        }

        match self {
            WithdrawalPolicy::TraditionalFirst => {
                drawdown.take_in_order(&[Account::Traditional, Account::Taxable, Account::Roth]);
            }
            WithdrawalPolicy::RothFirst => {
                drawdown.take_in_order(&[Account::Roth, Account::Taxable, Account::Traditional]);
            }
            WithdrawalPolicy::TaxOptimized => {
                drawdown.take(Account::Traditional, context.bracket_room());
                drawdown.take_in_order(&[Account::Taxable, Account::Roth]);
                // Exceed the target bracket rather than leave spending unmet.
                drawdown.take(Account::Traditional, f64::INFINITY);
            }
            WithdrawalPolicy::Proportional => drawdown.take_proportionally(),
        }

        drawdown.request
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyContext {
    pub guaranteed_taxable_income: f64,
    pub target_bracket_ceiling: f64,
    pub standard_deduction: f64,
}

impl PolicyContext {
    pub fn bracket_room(&self) -> f64 {
        (self.target_bracket_ceiling - self.guaranteed_taxable_income + self.standard_deduction)
            .max(0.0)
    }
}

#[derive(Copy, Clone, Debug)]
enum Account {
    Taxable,
    Traditional,
    Roth,
}

struct Drawdown {
    available: AccountBalances,
    remaining: f64,
    request: WithdrawalRequest,
}

impl Drawdown {
    fn new(balances: &AccountBalances, amount_needed: f64) -> Self {
        Self {
            available: balances.clamped(),
            remaining: amount_needed.max(0.0),
            request: WithdrawalRequest::default(),
        }
    }

    fn take(&mut self, account: Account, cap: f64) {
        if self.remaining <= 0.0 {
            return;
        }

        let (balance, drawn) = match account {
            Account::Taxable => (&mut self.available.taxable, &mut self.request.taxable),
            Account::Traditional => (&mut self.available.traditional, &mut self.request.traditional),
            Account::Roth => (&mut self.available.roth, &mut self.request.roth),
        };

        let x = balance.min(cap).min(self.remaining).max(0.0);
        *balance -= x;
        *drawn += x;
        self.remaining -= x;
    }

    fn take_in_order(&mut self, order: &[Account]) {
        for account in order {
            self.take(*account, f64::INFINITY);
        }
    }

    fn take_proportionally(&mut self) {
        let total = self.available.spendable();
        if total <= 0.0 {
            return;
        }

        if self.remaining >= total {
            self.take_in_order(&[Account::Taxable, Account::Traditional, Account::Roth]);
            return;
        }

        let scale = self.remaining / total;
        let shares = [
            (Account::Taxable, self.available.taxable),
            (Account::Traditional, self.available.traditional),
            (Account::Roth, self.available.roth),
        ];
        let last_funded = shares
            .iter()
            .rposition(|(_, balance)| *balance > 0.0)
            .unwrap_or(0);

        for (index, (account, balance)) in shares.into_iter().enumerate() {
            // The last funded account takes what is left so the total lands on the need.
            let cap = if index == last_funded {
                f64::INFINITY
            } else {
                balance * scale
            };
            self.take(account, cap);
        }
    }
}
