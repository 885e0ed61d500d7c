//! Core business logic for Tally.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! All domain types, validation rules, and balance calculations live here.
//!
//! # Modules
//!
//! - `ledger` - Point transactions, balance effects, settlement

pub mod ledger;
