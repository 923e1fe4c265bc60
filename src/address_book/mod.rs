use std::{fs, path::Path, str::FromStr, time::Duration};

use ethers::types::H160;
use eyre::{eyre, WrapErr};
use serde::{Deserialize, Serialize};

pub const DEPLOYMENT_FILE_ENV: &str = "DEPLOYMENT_FILE";

/// Chain endpoint and contract addresses of one deployment. No address has a
/// default: everything comes from the environment or a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressBook {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub router: H160,
    pub wrapped: H160,
    pub token: H160,
    #[serde(default = "default_native_symbol")]
    pub native_symbol: String,
    #[serde(default = "default_wrapped_symbol")]
    pub wrapped_symbol: String,
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
    #[serde(default)]
    pub settings: SwapSettings,
}

fn default_native_symbol() -> String {
    "TIA".to_string()
}

fn default_wrapped_symbol() -> String {
    "WTIA".to_string()
}

fn default_token_symbol() -> String {
    "YTK".to_string()
}

/// Tunables shared by the quote engine, the orchestrator and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapSettings {
    /// Smallest amount (in whole tokens) accepted for a swap.
    pub min_swap_amount: String,
    pub gas_buffer_percent: u64,
    pub quote_debounce_ms: u64,
    pub balance_refresh_interval_ms: u64,
    pub deadline_buffer_secs: u64,
    /// Allowance granted by an approval, in whole tokens.
    pub approval_amount: String,
    pub default_slippage_percent: f64,
    pub estimate_gas: bool,
}

impl Default for SwapSettings {
    fn default() -> Self {
        SwapSettings {
            min_swap_amount: "0.000001".to_string(),
            gas_buffer_percent: 20,
            quote_debounce_ms: 300,
            balance_refresh_interval_ms: 10_000,
            deadline_buffer_secs: 3600,
            approval_amount: "1000000".to_string(),
            default_slippage_percent: 1.0,
            estimate_gas: true,
        }
    }
}

impl SwapSettings {
    pub fn quote_debounce(&self) -> Duration {
        Duration::from_millis(self.quote_debounce_ms)
    }

    pub fn balance_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.balance_refresh_interval_ms)
    }
}

fn env_var(key: &str) -> eyre::Result<String> {
    std::env::var(key).map_err(|_| eyre!("Could not load env `{}`", key))
}

fn env_or(key: &str, default: fn() -> String) -> String {
    std::env::var(key).unwrap_or_else(|_| default())
}

fn env_address(key: &str) -> eyre::Result<H160> {
    let value = env_var(key)?;
    H160::from_str(value.trim()).map_err(|err| eyre!("invalid address in `{}`: {}", key, err))
}

impl AddressBook {
    pub fn from_env() -> eyre::Result<Self> {
        let chain_id = env_var("CHAIN_ID")?
            .trim()
            .parse::<u64>()
            .wrap_err("`CHAIN_ID` is not a number")?;
        Ok(AddressBook {
            chain_id,
            chain_name: env_var("CHAIN_NAME")?,
            rpc_url: env_var("CHAIN_RPC")?,
            router: env_address("ROUTER_ADDRESS")?,
            wrapped: env_address("WTIA_ADDRESS")?,
            token: env_address("TOKEN_ADDRESS")?,
            native_symbol: env_or("NATIVE_SYMBOL", default_native_symbol),
            wrapped_symbol: env_or("WRAPPED_SYMBOL", default_wrapped_symbol),
            token_symbol: env_or("TOKEN_SYMBOL", default_token_symbol),
            settings: SwapSettings::default(),
        })
    }

    pub fn from_yaml_str(data: &str) -> eyre::Result<Self> {
        serde_yaml::from_str(data).wrap_err("Could not parse deployment file")
    }

    pub fn from_yaml(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .wrap_err_with(|| format!("Could not read {}", path.display()))?;
        Self::from_yaml_str(&data)
    }

    /// An explicit file wins, then `DEPLOYMENT_FILE`, then plain env vars.
    pub fn load(deployment: Option<&Path>) -> eyre::Result<Self> {
        match deployment {
            Some(path) => Self::from_yaml(path),
            None => match std::env::var(DEPLOYMENT_FILE_ENV) {
                Ok(path) => Self::from_yaml(path),
                Err(_) => Self::from_env(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use serial_test::serial;

    const ENV_KEYS: [&str; 10] = [
        "CHAIN_ID",
        "CHAIN_NAME",
        "CHAIN_RPC",
        "ROUTER_ADDRESS",
        "WTIA_ADDRESS",
        "TOKEN_ADDRESS",
        "NATIVE_SYMBOL",
        "WRAPPED_SYMBOL",
        "TOKEN_SYMBOL",
        DEPLOYMENT_FILE_ENV,
    ];

    fn set_env(vars: std::collections::HashMap<&str, &str>) {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
    }

    fn full_env() -> std::collections::HashMap<&'static str, &'static str> {
        hashmap! {
            "CHAIN_ID" => "984123",
            "CHAIN_NAME" => "Forma Sketchpad",
            "CHAIN_RPC" => "https://rpc.sketchpad-1.forma.art",
            "ROUTER_ADDRESS" => "0x592a36b069843cbaEB0df6FA1cFae5009418E45d",
            "WTIA_ADDRESS" => "0xBae5E4D473FdAAc18883850c56857Be7874b7B9c",
            "TOKEN_ADDRESS" => "0x00822A3c6CA0E9944B3fc4b79849fa20037fa2C6",
        }
    }

    #[test]
    #[serial]
    fn test_from_env() {
        set_env(full_env());
        let book = AddressBook::from_env().unwrap();
        assert_eq!(book.chain_id, 984123);
        assert_eq!(book.chain_name, "Forma Sketchpad");
        assert_eq!(
            book.router,
            H160::from_str("0x592a36b069843cbaeb0df6fa1cfae5009418e45d").unwrap()
        );
        assert_eq!(book.native_symbol, "TIA");
        assert_eq!(book.token_symbol, "YTK");
        assert_eq!(book.settings, SwapSettings::default());
    }

    #[test]
    #[serial]
    fn test_from_env_missing_router() {
        let mut vars = full_env();
        vars.remove("ROUTER_ADDRESS");
        set_env(vars);
        let err = AddressBook::from_env().unwrap_err();
        assert!(err.to_string().contains("ROUTER_ADDRESS"), "{}", err);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_address() {
        let mut vars = full_env();
        vars.insert("TOKEN_ADDRESS", "0x1234");
        set_env(vars);
        let err = AddressBook::from_env().unwrap_err();
        assert!(err.to_string().contains("invalid address"), "{}", err);
    }

    #[test]
    #[serial]
    fn test_load_prefers_env_without_file() {
        set_env(full_env());
        let book = AddressBook::load(None).unwrap();
        assert_eq!(book.chain_id, 984123);
    }

    #[test]
    fn test_from_yaml_str() {
        let data = r#"
chain_id: 984123
chain_name: Forma Sketchpad
rpc_url: https://rpc.sketchpad-1.forma.art
router: "0x52FfddaD55fa773b4f127159E02C4C9B0cF54717"
wrapped: "0xBae5E4D473FdAAc18883850c56857Be7874b7B9c"
token: "0x00822a3c6ca0e9944b3fc4b79849fa20037fa2c6"
token_symbol: YTK
settings:
  gas_buffer_percent: 30
"#;
        let book = AddressBook::from_yaml_str(data).unwrap();
        assert_eq!(book.wrapped_symbol, "WTIA");
        assert_eq!(book.settings.gas_buffer_percent, 30);
        assert_eq!(book.settings.deadline_buffer_secs, 3600);
        // mixed-case and lower-case spellings are the same address
        assert_eq!(
            book.token,
            H160::from_str("0x00822A3c6CA0E9944B3fc4b79849fa20037fa2C6").unwrap()
        );
    }

    #[test]
    #[serial]
    fn test_yaml_and_env_books_compare_equal() {
        set_env(full_env());
        let from_env = AddressBook::from_env().unwrap();
        let data = r#"
chain_id: 984123
chain_name: Forma Sketchpad
rpc_url: https://rpc.sketchpad-1.forma.art
router: "0x592a36b069843cbaEB0df6FA1cFae5009418E45d"
wrapped: "0xBae5E4D473FdAAc18883850c56857Be7874b7B9c"
token: "0x00822A3c6CA0E9944B3fc4b79849fa20037fa2C6"
"#;
        let from_yaml = AddressBook::from_yaml_str(data).unwrap();
        assert_eq!(from_env, from_yaml);

        let mut tighter = from_yaml.clone();
        tighter.settings.default_slippage_percent = 0.5;
        assert_ne!(from_env, tighter);
    }

    #[test]
    fn test_from_yaml_missing_token() {
        let data = r#"
chain_id: 1
chain_name: x
rpc_url: http://localhost:8545
router: "0x52FfddaD55fa773b4f127159E02C4C9B0cF54717"
wrapped: "0xBae5E4D473FdAAc18883850c56857Be7874b7B9c"
"#;
        assert!(AddressBook::from_yaml_str(data).is_err());
    }
}
