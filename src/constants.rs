/// Application constants

// API version
pub const API_VERSION: &str = "v1";

// Chain defaults
pub const DEFAULT_CHAIN_ID: u64 = 1;

// Bank transaction refresh: fixed 30-day window, at most 100 records
pub const TRANSACTION_WINDOW_DAYS: i64 = 30;
pub const TRANSACTION_REFRESH_LIMIT: u32 = 100;
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 50;

// Balances are rendered with a fixed number of fractional digits
pub const BALANCE_DISPLAY_DECIMALS: usize = 6;

// Chat context windows
pub const CHAT_CONTEXT_TRANSACTIONS: usize = 20;
pub const CHAT_CONTEXT_MESSAGES: usize = 5;
pub const CHAT_HISTORY_LIMIT: i64 = 50;

// Provider client timeouts
pub const PROVIDER_CONNECT_TIMEOUT_SECS: u64 = 4;
pub const PROVIDER_REQUEST_TIMEOUT_SECS: u64 = 12;

/// One entry of the per-chain token allow-list. The native asset carries no
/// contract address.
#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    pub address: Option<&'static str>,
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
}

const MAINNET_TOKENS: &[TokenInfo] = &[
    TokenInfo {
        address: None,
        symbol: "ETH",
        name: "Ethereum",
        decimals: 18,
    },
    TokenInfo {
        address: Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        symbol: "USDC",
        name: "USD Coin",
        decimals: 6,
    },
    TokenInfo {
        address: Some("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
        symbol: "USDT",
        name: "Tether USD",
        decimals: 6,
    },
];

const BASE_TOKENS: &[TokenInfo] = &[
    TokenInfo {
        address: None,
        symbol: "ETH",
        name: "Ethereum",
        decimals: 18,
    },
    TokenInfo {
        address: Some("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        symbol: "USDC",
        name: "USD Coin",
        decimals: 6,
    },
];

const ARBITRUM_TOKENS: &[TokenInfo] = &[
    TokenInfo {
        address: None,
        symbol: "ETH",
        name: "Ethereum",
        decimals: 18,
    },
    TokenInfo {
        address: Some("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
        symbol: "USDC",
        name: "USD Coin",
        decimals: 6,
    },
];

/// Statically configured balance allow-list for a chain. Unknown chains have
/// no tokens.
pub fn supported_tokens(chain_id: u64) -> &'static [TokenInfo] {
    match chain_id {
        1 => MAINNET_TOKENS,
        8453 => BASE_TOKENS,
        42161 => ARBITRUM_TOKENS,
        _ => &[],
    }
}

/// Ordered categorization rules: first keyword hit wins, scanning is
/// case-insensitive over the transaction description. Order is part of the
/// contract and must not be rearranged.
pub const CATEGORY_RULES: &[(&[&str], &str)] = &[
    (&["transfer", "send"], "Transfer"),
    (&["atm", "withdrawal"], "Cash Withdrawal"),
    (&["grocery", "supermarket"], "Groceries"),
    (&["fuel", "gas", "petrol"], "Transportation"),
    (&["restaurant", "food", "dining"], "Food & Dining"),
    (&["subscription", "netflix", "spotify"], "Subscriptions"),
    (&["salary", "payroll"], "Income"),
    (&["bill", "utility", "electricity"], "Bills & Utilities"),
    (&["shopping", "amazon", "store"], "Shopping"),
    (&["medical", "hospital", "pharmacy"], "Healthcare"),
];

pub const CATEGORY_OTHER: &str = "Other";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_chain_list_starts_with_its_native_asset() {
        for chain_id in [1_u64, 8453, 42161] {
            let tokens = supported_tokens(chain_id);
            assert!(!tokens.is_empty());
            assert!(tokens[0].address.is_none());
            assert!(tokens[1..].iter().all(|t| t.address.is_some()));
        }
    }

    #[test]
    fn unknown_chain_has_no_tokens() {
        assert!(supported_tokens(137).is_empty());
    }
}
