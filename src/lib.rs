pub mod address_book;
pub mod amm;
pub mod backend;
pub mod balances;
pub mod contract;
pub mod error;
pub mod eth_provider;
pub mod format;
pub mod market;
pub mod quote;
pub mod token;
pub mod trade;
