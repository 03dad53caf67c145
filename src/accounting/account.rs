//! Chart-of-accounts entries with prefix-derived sign discipline.

use crate::money::Money;
use serde::{Deserialize, Serialize};

/// The five ledger account types. The path prefix decides the type, the
/// type decides which posting side increases the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Debit-increasing.
    Asset,
    /// Credit-increasing.
    Liability,
    /// Credit-increasing.
    Equity,
    /// Credit-increasing.
    Revenue,
    /// Debit-increasing.
    Expense,
}

impl AccountType {
    /// Infer the type from the first path segment. Unknown prefixes fall
    /// back to `Asset`; the engine logs those, they indicate a typo in a
    /// posting site.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path.split(':').next().unwrap_or("") {
            "Assets" => AccountType::Asset,
            "Liabilities" => AccountType::Liability,
            "Equity" => AccountType::Equity,
            "Revenue" => AccountType::Revenue,
            "Expenses" => AccountType::Expense,
            _ => AccountType::Asset,
        }
    }

    /// True when a debit increases this account's balance.
    #[must_use]
    #[inline]
    pub fn debit_increases(self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    /// True for the left side of the accounting identity
    /// `Assets + Expenses = Liabilities + Equity + Revenue`.
    #[must_use]
    #[inline]
    pub fn is_left_side(self) -> bool {
        self.debit_increases()
    }
}

/// One ledger account: a path, its inferred type and a running balance.
///
/// Balances are kept in each type's natural sign, so a healthy account is
/// normally non-negative on both sides of the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// Colon-separated account path, e.g. `Liabilities:Customer:42:Balance`.
    pub path: String,
    /// Type inferred from the path prefix at creation.
    pub account_type: AccountType,
    /// Running balance in micro-MNT, natural sign for the type.
    pub balance: Money,
}

impl LedgerAccount {
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            account_type: AccountType::from_path(path),
            balance: Money::ZERO,
        }
    }

    /// Apply a debit of `amount`.
    pub fn debit(&mut self, amount: Money) {
        if self.account_type.debit_increases() {
            self.balance += amount;
        } else {
            self.balance -= amount;
        }
    }

    /// Apply a credit of `amount`.
    pub fn credit(&mut self, amount: Money) {
        if self.account_type.debit_increases() {
            self.balance -= amount;
        } else {
            self.balance += amount;
        }
    }
}

/// Well-known account paths used by the settlement pipeline.
pub mod paths {
    /// Customer free balance (exchange liability).
    #[must_use]
    pub fn customer_balance(user: u64) -> String {
        format!("Liabilities:Customer:{user}:Balance")
    }

    /// Customer locked margin (exchange liability).
    #[must_use]
    pub fn customer_margin(user: u64) -> String {
        format!("Liabilities:Customer:{user}:Margin")
    }

    /// The exchange cash asset backing customer funds.
    pub const CASH: &str = "Assets:Cash";

    /// The insurance fund asset pool.
    pub const INSURANCE_FUND: &str = "Assets:InsuranceFund";

    /// Insurance-related expense (bankruptcy absorption).
    pub const INSURANCE_EXPENSE: &str = "Expenses:Insurance";

    /// Spread revenue on a symbol.
    #[must_use]
    pub fn spread_revenue(symbol: &str) -> String {
        format!("Revenue:Trading:Spread:{symbol}")
    }

    /// Explicit fee revenue on a symbol.
    #[must_use]
    pub fn fee_revenue(symbol: &str) -> String {
        format!("Revenue:Trading:Fees:{symbol}")
    }

    /// Insurance contributions set aside out of revenue.
    pub const INSURANCE_CONTRIB_EXPENSE: &str = "Expenses:InsuranceContribution";

    /// VAT owed to the tax authority.
    pub const VAT_PAYABLE: &str = "Liabilities:Tax:VAT";

    /// Funding received by the exchange pool on a symbol.
    #[must_use]
    pub fn funding_revenue(symbol: &str) -> String {
        format!("Revenue:Funding:{symbol}")
    }

    /// Funding paid out of the exchange pool on a symbol.
    #[must_use]
    pub fn funding_expense(symbol: &str) -> String {
        format!("Expenses:Funding:{symbol}")
    }

    /// Trading P&L pool against which customer P&L settles.
    pub const PNL_POOL: &str = "Expenses:TradingPnl";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference_from_prefix() {
        assert_eq!(AccountType::from_path("Assets:Cash"), AccountType::Asset);
        assert_eq!(
            AccountType::from_path("Liabilities:Customer:1:Balance"),
            AccountType::Liability
        );
        assert_eq!(AccountType::from_path("Equity:Capital"), AccountType::Equity);
        assert_eq!(
            AccountType::from_path("Revenue:Trading:Fees:BTC-PERP"),
            AccountType::Revenue
        );
        assert_eq!(
            AccountType::from_path("Expenses:Funding:BTC-PERP"),
            AccountType::Expense
        );
    }

    #[test]
    fn test_sign_discipline() {
        let mut cash = LedgerAccount::new(paths::CASH);
        cash.debit(Money::from_mnt(100));
        cash.credit(Money::from_mnt(30));
        assert_eq!(cash.balance, Money::from_mnt(70));

        let mut customer = LedgerAccount::new(&paths::customer_balance(1));
        customer.credit(Money::from_mnt(100));
        customer.debit(Money::from_mnt(30));
        assert_eq!(customer.balance, Money::from_mnt(70));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(paths::customer_balance(42), "Liabilities:Customer:42:Balance");
        assert_eq!(paths::customer_margin(42), "Liabilities:Customer:42:Margin");
        assert_eq!(paths::fee_revenue("BTC-PERP"), "Revenue:Trading:Fees:BTC-PERP");
    }
}
