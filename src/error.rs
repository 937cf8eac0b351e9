//! Error types for consensus validation
//!
//! Three families never mix: rule violations mean the candidate is provably
//! invalid, assertions mean the caller broke a contract, and store failures are
//! local outages of the backing UTXO storage.

use std::fmt;
use thiserror::Error;

/// Identifies the specific consensus rule a block or transaction violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateBlock,
    BlockTooBig,
    InvalidTime,
    TimeTooOld,
    TimeTooNew,
    UnexpectedDifficulty,
    HighHash,
    BadMerkleRoot,
    BadCheckpoint,
    ForkTooOld,
    NoTransactions,
    NoTxInputs,
    NoTxOutputs,
    TxTooBig,
    BadTxOutValue,
    DuplicateTxInputs,
    BadTxInput,
    MissingTxOut,
    UnfinalizedTx,
    DuplicateTx,
    ImmatureSpend,
    SpendTooHigh,
    BadFees,
    TooManySigOps,
    FirstTxNotCoinbase,
    MultipleCoinbases,
    BadCoinbaseScriptLen,
    BadCoinbaseValue,
    MissingCoinbaseHeight,
    BadCoinbaseHeight,
    ScriptValidation,
    PrevBlockNotBest,
    MissingParent,
}

impl ErrorKind {
    /// Stable identifier surfaced verbatim to logs and RPC responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DuplicateBlock => "ErrDuplicateBlock",
            ErrorKind::BlockTooBig => "ErrBlockTooBig",
            ErrorKind::InvalidTime => "ErrInvalidTime",
            ErrorKind::TimeTooOld => "ErrTimeTooOld",
            ErrorKind::TimeTooNew => "ErrTimeTooNew",
            ErrorKind::UnexpectedDifficulty => "ErrUnexpectedDifficulty",
            ErrorKind::HighHash => "ErrHighHash",
            ErrorKind::BadMerkleRoot => "ErrBadMerkleRoot",
            ErrorKind::BadCheckpoint => "ErrBadCheckpoint",
            ErrorKind::ForkTooOld => "ErrForkTooOld",
            ErrorKind::NoTransactions => "ErrNoTransactions",
            ErrorKind::NoTxInputs => "ErrNoTxInputs",
            ErrorKind::NoTxOutputs => "ErrNoTxOutputs",
            ErrorKind::TxTooBig => "ErrTxTooBig",
            ErrorKind::BadTxOutValue => "ErrBadTxOutValue",
            ErrorKind::DuplicateTxInputs => "ErrDuplicateTxInputs",
            ErrorKind::BadTxInput => "ErrBadTxInput",
            ErrorKind::MissingTxOut => "ErrMissingTxOut",
            ErrorKind::UnfinalizedTx => "ErrUnfinalizedTx",
            ErrorKind::DuplicateTx => "ErrDuplicateTx",
            ErrorKind::ImmatureSpend => "ErrImmatureSpend",
            ErrorKind::SpendTooHigh => "ErrSpendTooHigh",
            ErrorKind::BadFees => "ErrBadFees",
            ErrorKind::TooManySigOps => "ErrTooManySigOps",
            ErrorKind::FirstTxNotCoinbase => "ErrFirstTxNotCoinbase",
            ErrorKind::MultipleCoinbases => "ErrMultipleCoinbases",
            ErrorKind::BadCoinbaseScriptLen => "ErrBadCoinbaseScriptLen",
            ErrorKind::BadCoinbaseValue => "ErrBadCoinbaseValue",
            ErrorKind::MissingCoinbaseHeight => "ErrMissingCoinbaseHeight",
            ErrorKind::BadCoinbaseHeight => "ErrBadCoinbaseHeight",
            ErrorKind::ScriptValidation => "ErrScriptValidation",
            ErrorKind::PrevBlockNotBest => "ErrPrevBlockNotBest",
            ErrorKind::MissingParent => "ErrMissingParent",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("{kind}: {description}")]
    Rule {
        kind: ErrorKind,
        description: String,
    },

    #[error("assertion failed: {0}")]
    Assert(String),

    #[error("utxo store failure: {0}")]
    Store(#[from] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConsensusError {
    /// The violated rule, if this is a rule violation.
    pub fn rule_kind(&self) -> Option<ErrorKind> {
        match self {
            ConsensusError::Rule { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_rule_violation(&self) -> bool {
        matches!(self, ConsensusError::Rule { .. })
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, ConsensusError::Assert(_))
    }
}

/// Builds a rule violation of the given kind.
pub fn rule_error(kind: ErrorKind, description: impl Into<String>) -> ConsensusError {
    ConsensusError::Rule {
        kind,
        description: description.into(),
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
