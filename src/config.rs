use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Bank aggregation provider (Mono-style REST API)
    pub bank_api_url: String,
    pub bank_secret_key: String,

    // EVM JSON-RPC endpoints, one per supported chain
    pub ethereum_rpc_url: String,
    pub base_rpc_url: Option<String>,
    pub arbitrum_rpc_url: Option<String>,

    // Generative AI provider (Gemini-style REST API)
    pub gemini_api_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            bank_api_url: env::var("BANK_API_URL")
                .unwrap_or_else(|_| "https://api.withmono.com".to_string()),
            bank_secret_key: env::var("BANK_SECRET_KEY")?,

            ethereum_rpc_url: env::var("ETHEREUM_RPC_URL")?,
            base_rpc_url: env::var("BASE_RPC_URL").ok(),
            arbitrum_rpc_url: env::var("ARBITRUM_RPC_URL").ok(),

            gemini_api_url: env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-1.5-flash".to_string()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.ethereum_rpc_url.trim().is_empty() {
            anyhow::bail!("ETHEREUM_RPC_URL is empty");
        }
        if self.bank_secret_key.trim().is_empty() {
            anyhow::bail!("BANK_SECRET_KEY is empty");
        }

        if self.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; chat replies will use the fallback message");
        }
        if self.base_rpc_url.is_none() {
            tracing::warn!("BASE_RPC_URL is not set; Base balances are unavailable");
        }
        if self.arbitrum_rpc_url.is_none() {
            tracing::warn!("ARBITRUM_RPC_URL is not set; Arbitrum balances are unavailable");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    /// JSON-RPC endpoint for a supported chain id, if configured.
    pub fn rpc_url_for(&self, chain_id: u64) -> Option<&str> {
        match chain_id {
            1 => Some(self.ethereum_rpc_url.as_str()),
            8453 => self.base_rpc_url.as_deref(),
            42161 => self.arbitrum_rpc_url.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "0.0.0.0".to_string(),
        port: 3000,
        environment: "development".to_string(),
        database_url: "postgres://localhost/onchainbudget_test".to_string(),
        database_max_connections: 1,
        bank_api_url: "https://api.withmono.com".to_string(),
        bank_secret_key: "test_secret".to_string(),
        ethereum_rpc_url: "http://localhost:8545".to_string(),
        base_rpc_url: None,
        arbitrum_rpc_url: None,
        gemini_api_url: "https://generativelanguage.googleapis.com".to_string(),
        gemini_api_key: None,
        gemini_model: "gemini-1.5-flash".to_string(),
        cors_allowed_origins: "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_url_for_maps_supported_chains() {
        let mut config = test_config();
        config.base_rpc_url = Some("http://localhost:8544".to_string());

        assert_eq!(config.rpc_url_for(1), Some("http://localhost:8545"));
        assert_eq!(config.rpc_url_for(8453), Some("http://localhost:8544"));
        assert_eq!(config.rpc_url_for(42161), None);
        assert_eq!(config.rpc_url_for(137), None);
    }
}
