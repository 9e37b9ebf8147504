//! Core types and algorithms for the Tally guarantee ledger.
//!
//! The ledger is an append-only, per-aggregate history that can reconstruct
//! the state of a guarantee at any point in its lifetime. Events are stored
//! either as full snapshots (anchors), as minimal field patches, or, for rows
//! written before the hybrid format existed, as a legacy snapshot that is
//! normalised on read.
//!
//! This crate is free of database dependencies. Storage backends implement
//! [`store::LedgerStore`]; the live domain tables are reached only through
//! [`provider::StateSnapshotProvider`].

pub mod artifact;
pub mod error;
pub mod event;
pub mod ledger;
pub mod legacy;
pub mod patch;
pub mod policy;
pub mod provider;
pub mod reconstruct;
pub mod record;
pub mod state;
pub mod store;

pub use error::{Error, MalformedState, Result};
pub use ledger::{AppendRequest, Ledger};
