use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// User-facing failure categories. Every error that reaches the CLI is
/// reported as one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidAmount,
    InsufficientFunds,
    TransactionRevert,
    NetworkError,
    InvalidAddress,
    NoLiquidity,
    RouterNotDeployed,
    QuoteUnavailable,
}

const REVERT_PATTERNS: [&str; 5] = [
    "call revert exception",
    "call_exception",
    "missing revert data",
    "execution reverted",
    "reverted",
];

impl ErrorKind {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAmount => "Invalid amount",
            ErrorKind::InsufficientFunds => "Insufficient funds for gas",
            ErrorKind::TransactionRevert => {
                "Transaction would revert - check contract state or parameters"
            }
            ErrorKind::NetworkError => "Network error",
            ErrorKind::InvalidAddress => "Invalid contract address",
            ErrorKind::NoLiquidity => "No liquidity",
            ErrorKind::RouterNotDeployed => "Router not deployed",
            ErrorKind::QuoteUnavailable => "Quote unavailable",
        }
    }

    /// Maps an underlying error message onto a category by substring match.
    /// The order matters: a revert message mentioning the network is still a revert.
    pub fn classify(message: &str) -> Option<ErrorKind> {
        let message = message.to_lowercase();
        if REVERT_PATTERNS.iter().any(|p| message.contains(p)) {
            return Some(ErrorKind::TransactionRevert);
        }
        if message.contains("insufficient funds") {
            return Some(ErrorKind::InsufficientFunds);
        }
        if message.contains("network")
            || message.contains("error sending request")
            || message.contains("connection refused")
            || message.contains("timed out")
        {
            return Some(ErrorKind::NetworkError);
        }
        if message.contains("invalid address") {
            return Some(ErrorKind::InvalidAddress);
        }
        if message.contains("no liquidity") {
            return Some(ErrorKind::NoLiquidity);
        }
        if message.contains("not deployed") {
            return Some(ErrorKind::RouterNotDeployed);
        }
        if message.contains("invalid amount") {
            return Some(ErrorKind::InvalidAmount);
        }
        if message.contains("quote unavailable") {
            return Some(ErrorKind::QuoteUnavailable);
        }
        None
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct DexError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl DexError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        DexError {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_amount(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidAmount, detail)
    }

    /// Classifies any error by its full rendered chain, falling back to
    /// `fallback` when no pattern matches.
    pub fn classify<E: fmt::Display + ?Sized>(err: &E, fallback: ErrorKind) -> Self {
        let detail = format!("{:#}", err);
        let kind = ErrorKind::classify(&detail).unwrap_or(fallback);
        DexError { kind, detail }
    }
}

impl fmt::Display for DexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() || self.detail == self.kind.message() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.detail)
        }
    }
}

impl From<eyre::Report> for DexError {
    fn from(err: eyre::Report) -> Self {
        DexError::classify(&err, ErrorKind::TransactionRevert)
    }
}
