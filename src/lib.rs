//! visit-backfill - one-shot Firestore migration
//!
//! Copies each employee's `adminId` onto the visits that reference them,
//! through either an atomic batch-commit transport or per-document REST
//! patches.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod firestore;
pub mod migration;
pub mod store;
