//! Model Services
//!
//! This module contains the core model logic services:
//!
//! - `ValidationEngine` - rule-based structural validation of graphs
//! - `SliverProjector` - typed sliver views of NetworkNode subtrees
//! - `ArmPartitioner` - splits ARMs into per-delegation ADMs
//! - `CbmMerger` - merges ADMs into a combined broker model and back out
//! - `BqmProjector` - answers broker queries with fresh BQM graphs
//!
//! Services coordinate between the store layer and the brokering pipeline,
//! validating their own outputs before publishing them.

pub mod error;
pub mod merge;
pub mod partition;
pub mod query;
pub mod sliver;
pub mod validation;

pub use error::ModelError;
pub use merge::CbmMerger;
pub use partition::{AdmGraph, ArmPartitioner};
pub use query::{BqmProjector, BqmQuery, DetailLevel, NoReservations, ReservationProvider};
pub use sliver::SliverProjector;
pub use validation::{
    base_rules, resource_rules, Rule, RulePredicate, RuleSet, ValidationEngine, ValidationReport,
};
