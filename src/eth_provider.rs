use std::{sync::Arc, time::Duration};

use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
};
use eyre::{bail, WrapErr};
use tracing::info;

use crate::{address_book::AddressBook, backend::EthersBackend};

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

const POLL_INTERVAL: Duration = Duration::from_millis(2000);

pub struct EthProvider {
    pub http: Arc<Provider<Http>>,
    pub http_endpoint: String,
    pub chain_id: u64,
    pub chain_name: String,
}

impl EthProvider {
    pub fn new(http_endpoint: &str, chain_id: u64, chain_name: &str) -> eyre::Result<EthProvider> {
        let http = Provider::<Http>::try_from(http_endpoint)
            .wrap_err_with(|| format!("Invalid RPC url `{}`", http_endpoint))?
            .interval(POLL_INTERVAL);
        Ok(EthProvider {
            http: Arc::new(http),
            http_endpoint: http_endpoint.to_string(),
            chain_id,
            chain_name: chain_name.to_string(),
        })
    }

    pub fn from_address_book(book: &AddressBook) -> eyre::Result<EthProvider> {
        Self::new(&book.rpc_url, book.chain_id, &book.chain_name)
    }

    pub fn private_key() -> Option<String> {
        std::env::var("PRIVATE_KEY").ok().filter(|k| !k.trim().is_empty())
    }

    pub async fn get_chain_id(&self) -> eyre::Result<u64> {
        let id = self
            .http
            .get_chainid()
            .await
            .wrap_err("Could not get chain id")?;
        Ok(id.as_u64())
    }

    /// Fails unless the node serves the configured chain.
    pub async fn verify_chain(&self) -> eyre::Result<()> {
        let actual = self.get_chain_id().await?;
        check_chain_id(self.chain_id, actual, &self.chain_name)
    }

    pub async fn get_signer_middleware(&self, private_key: &str) -> eyre::Result<Arc<SignerClient>> {
        self.verify_chain().await?;
        let wallet = parse_wallet(private_key, self.chain_id)?;
        info!(account = ?wallet.address(), chain_id = self.chain_id, "wallet connected");
        Ok(Arc::new(SignerMiddleware::new(
            (*self.http).clone(),
            wallet,
        )))
    }

    /// Backend for read-only commands; submitting through it fails.
    pub fn read_backend(&self, book: &AddressBook) -> EthersBackend<Provider<Http>> {
        EthersBackend::new(self.http.clone(), book.router, book.wrapped, None)
    }

    pub async fn signer_backend(
        &self,
        book: &AddressBook,
        private_key: &str,
    ) -> eyre::Result<EthersBackend<SignerClient>> {
        let client = self.get_signer_middleware(private_key).await?;
        let account = client.address();
        Ok(EthersBackend::new(
            client,
            book.router,
            book.wrapped,
            Some(account),
        ))
    }
}

pub fn parse_wallet(private_key: &str, chain_id: u64) -> eyre::Result<LocalWallet> {
    let wallet = private_key
        .trim()
        .parse::<LocalWallet>()
        .wrap_err("Could not parse private key.")?;
    Ok(wallet.with_chain_id(chain_id))
}

pub fn check_chain_id(expected: u64, actual: u64, chain_name: &str) -> eyre::Result<()> {
    if expected != actual {
        bail!(
            "Wrong network. Please switch to {} (chain id {}), node reports chain id {}",
            chain_name,
            expected,
            actual
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DexError, ErrorKind};

    // well-known hardhat development key
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_check_chain_id() {
        assert!(check_chain_id(984123, 984123, "Forma Sketchpad").is_ok());
        let err = check_chain_id(984123, 1, "Forma Sketchpad").unwrap_err();
        assert!(err.to_string().contains("Forma Sketchpad"));
        assert_eq!(DexError::from(err).kind, ErrorKind::NetworkError);
    }

    #[test]
    fn test_parse_wallet() {
        let wallet = parse_wallet(DEV_KEY, 984123).unwrap();
        assert_eq!(wallet.chain_id(), 984123);
        assert_eq!(
            format!("{:?}", wallet.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert!(parse_wallet("not a key", 1).is_err());
    }

    #[test]
    fn test_new_rejects_bad_url() {
        assert!(EthProvider::new("not a url", 1, "x").is_err());
        let provider = EthProvider::new("http://localhost:8545", 984123, "Forma Sketchpad").unwrap();
        assert_eq!(provider.chain_id, 984123);
    }
}
