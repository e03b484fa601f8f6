// Pure conversions from provider records into the shared entities. Nothing in
// this module performs I/O; structural mismatches surface as typed errors.

use chrono::{DateTime, Utc};

use crate::{
    constants::{TokenInfo, CATEGORY_OTHER, CATEGORY_RULES},
    error::{AppError, Result},
    integrations::{ProviderBalance, ProviderBankAccount, ProviderBankTransaction},
    models::{BankAccount, BankTransaction, FlowKind, Portfolio, TokenBalance},
};

/// Deterministic, order-sensitive keyword categorization over the free-text
/// description. First matching rule wins; no match yields `Other`.
pub fn categorize(description: &str) -> &'static str {
    let desc = description.to_lowercase();
    for (keywords, category) in CATEGORY_RULES {
        if keywords.iter().any(|keyword| desc.contains(keyword)) {
            return category;
        }
    }
    CATEGORY_OTHER
}

fn require<T>(field: Option<T>, name: &str) -> Result<T> {
    field.ok_or_else(|| AppError::ProviderData(format!("Provider record is missing `{}`", name)))
}

pub fn bank_account(record: ProviderBankAccount, synced_at: DateTime<Utc>) -> Result<BankAccount> {
    let institution = require(
        record.institution.and_then(|i| i.name),
        "institution.name",
    )?;

    Ok(BankAccount {
        id: require(record.id, "id")?,
        name: require(record.name, "name")?,
        institution,
        account_type: require(record.account_type, "type")?,
        balance: require(record.balance, "balance")?,
        currency: require(record.currency, "currency")?,
        is_connected: true,
        last_synced: Some(synced_at),
    })
}

pub fn bank_transaction(
    account_id: &str,
    record: ProviderBankTransaction,
) -> Result<BankTransaction> {
    let description = require(record.narration, "narration")?;
    let kind = match require(record.kind, "type")?.as_str() {
        "credit" => FlowKind::Income,
        _ => FlowKind::Expense,
    };

    Ok(BankTransaction {
        id: require(record.id, "id")?,
        account_id: account_id.to_string(),
        amount: require(record.amount, "amount")?.abs(),
        kind,
        category: categorize(&description).to_string(),
        description,
        date: require(record.date, "date")?,
    })
}

/// Combines an allow-list entry with the gateway's raw balance. Prices are
/// not fetched here; value stays unset until a price source fills it in.
pub fn token_balance(token: &TokenInfo, fetched: ProviderBalance) -> TokenBalance {
    TokenBalance {
        address: token.address.unwrap_or("").to_string(),
        symbol: token.symbol.to_string(),
        name: token.name.to_string(),
        balance: fetched.balance,
        balance_formatted: fetched.balance_formatted,
        decimals: fetched.decimals,
        is_native: token.address.is_none(),
        price: None,
        change_24h: None,
        value: None,
    }
}

/// Pure portfolio derivation over the current balance set. The total is the
/// sum of non-negative per-token values; the aggregate 24h change is the
/// value-weighted average over tokens that carry one.
pub fn derive_portfolio(tokens: Vec<TokenBalance>) -> Portfolio {
    let total_value: f64 = tokens
        .iter()
        .map(|token| token.value.unwrap_or(0.0).max(0.0))
        .sum();

    let total_change_24h = if total_value > 0.0 {
        tokens
            .iter()
            .filter_map(|token| {
                let value = token.value?.max(0.0);
                Some(value * token.change_24h?)
            })
            .sum::<f64>()
            / total_value
    } else {
        0.0
    };

    Portfolio {
        total_value,
        total_change_24h,
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn sample_transaction(narration: &str) -> ProviderBankTransaction {
        ProviderBankTransaction {
            id: Some("tx_1".to_string()),
            amount: Some(Decimal::new(-2500, 2)),
            kind: Some("debit".to_string()),
            narration: Some(narration.to_string()),
            date: Some(Utc::now()),
            balance: None,
            currency: Some("NGN".to_string()),
            reference: None,
        }
    }

    #[test]
    fn categorization_is_order_sensitive() {
        // "withdrawal" hits the Cash Withdrawal rule before any later rule
        // could see the description.
        assert_eq!(categorize("ATM withdrawal fee"), "Cash Withdrawal");
        assert_eq!(categorize("Monthly Netflix subscription"), "Subscriptions");
        // "transfer" outranks "withdrawal" because its rule comes first.
        assert_eq!(categorize("transfer before withdrawal"), "Transfer");
        assert_eq!(categorize("quarterly dividends"), "Other");
    }

    #[test]
    fn categorization_is_case_insensitive() {
        assert_eq!(categorize("SALARY MAY 2024"), "Income");
        assert_eq!(categorize("Uber FUEL stop"), "Transportation");
    }

    #[test]
    fn debit_becomes_expense_with_absolute_amount() {
        let tx = bank_transaction("acc_1", sample_transaction("POS purchase")).unwrap();
        assert_eq!(tx.kind, FlowKind::Expense);
        assert_eq!(tx.amount, Decimal::new(2500, 2));
        assert_eq!(tx.account_id, "acc_1");
    }

    #[test]
    fn credit_becomes_income() {
        let mut record = sample_transaction("salary payment");
        record.kind = Some("credit".to_string());
        let tx = bank_transaction("acc_1", record).unwrap();
        assert_eq!(tx.kind, FlowKind::Income);
        assert_eq!(tx.category, "Income");
    }

    #[test]
    fn missing_required_field_is_a_schema_error() {
        let mut record = sample_transaction("ATM withdrawal");
        record.narration = None;
        let result = bank_transaction("acc_1", record);
        assert!(matches!(result, Err(AppError::ProviderData(_))));
    }

    #[test]
    fn native_token_normalizes_with_empty_address() {
        let token = TokenInfo {
            address: None,
            symbol: "ETH",
            name: "Ethereum",
            decimals: 18,
        };
        let balance = token_balance(
            &token,
            ProviderBalance {
                balance: "1500000000000000000".to_string(),
                balance_formatted: "1.500000".to_string(),
                decimals: 18,
            },
        );
        assert!(balance.is_native);
        assert!(balance.address.is_empty());
        assert_eq!(balance.balance_formatted, "1.500000");
    }

    fn valued_token(symbol: &str, value: Option<f64>, change: Option<f64>) -> TokenBalance {
        TokenBalance {
            address: String::new(),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            balance: "0".to_string(),
            balance_formatted: "0.000000".to_string(),
            decimals: 18,
            is_native: false,
            price: None,
            change_24h: change,
            value,
        }
    }

    #[test]
    fn portfolio_total_is_sum_of_token_values() {
        let portfolio = derive_portfolio(vec![
            valued_token("ETH", Some(1200.0), Some(2.0)),
            valued_token("USDC", Some(800.0), Some(0.0)),
            valued_token("DUST", None, None),
        ]);
        assert!((portfolio.total_value - 2000.0).abs() < f64::EPSILON);
        assert!((portfolio.total_change_24h - 1.2).abs() < 1e-9);
    }

    #[test]
    fn empty_portfolio_totals_zero() {
        let portfolio = derive_portfolio(Vec::new());
        assert_eq!(portfolio.total_value, 0.0);
        assert_eq!(portfolio.total_change_24h, 0.0);
        assert!(portfolio.tokens.is_empty());
    }

    #[test]
    fn negative_token_values_never_reduce_the_total() {
        let portfolio = derive_portfolio(vec![
            valued_token("ETH", Some(100.0), None),
            valued_token("BAD", Some(-50.0), None),
        ]);
        assert!((portfolio.total_value - 100.0).abs() < f64::EPSILON);
    }
}
