//! fleetpay-core: weekly payroll reconciliation for a fleet of contractor
//! drivers working across several ride-hailing and fleet platforms.
//!
//! Data flows one way:
//!   platform rows → normalizer → resolver → calculator → ledger
//! and downstream consumers (referrals, goals, KPI) read only finalized
//! weekly records.

pub mod calculator;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod goals;
pub mod kpi;
pub mod ledger;
pub mod money;
pub mod normalizer;
pub mod referral;
pub mod resolver;
pub mod roster;
pub mod store;
pub mod types;
pub mod week;
