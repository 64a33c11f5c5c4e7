//! Core types and utilities for the DUST ledger.
//!
//! This crate provides the foundational types used throughout the ledger:
//!
//! - **Identifiers**: `UserId`, `AppId`, `TransactionId`
//! - **Balances**: `Balance`, `BalanceChanged`
//! - **Transactions**: `Transaction`, `TransactionType`, `TransactionStatus`
//! - **Grants**: `AppGrant`, `GrantKind`, streak arithmetic
//!
//! # DUST Unit
//!
//! **1 DUST = 1 minor currency unit (1 cent)**
//!
//! - User buys $5 of DUST → gets 500 DUST
//! - An app action costing 3 DUST deducts 3 from the balance
//! - Stored as `i64` whole units; there is no fractional DUST

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod error;
pub mod grant;
pub mod ids;
pub mod transaction;

pub use balance::{Balance, BalanceChanged};
pub use error::{LedgerError, Result};
pub use grant::{
    next_streak, reward_day, AppGrant, GrantKind, INITIAL_GRANT_MAX, STREAK_CYCLE_DAYS,
    STREAK_GRANT_MAX,
};
pub use ids::{AppId, IdError, TransactionId, UserId};
pub use transaction::{
    validate_idempotency_key, Transaction, TransactionStatus, TransactionType,
    IDEMPOTENCY_KEY_MAX_LEN,
};
