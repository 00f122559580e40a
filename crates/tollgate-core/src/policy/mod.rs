//! Routing policy parsing and validation.
//!
//! A routing policy is structured data validated against an embedded JSON
//! Schema. It carries the backend pricing registry, the shape-to-tier
//! mapping, budget limits, quality gate thresholds and classifier keywords.

mod parser;
mod schema;

pub use parser::{
    AlertThresholds, BrandRules, BudgetLimits, ClassifierConfig, GateThreshold, PolicyError,
    QualityPolicy, QualityWeights, RoutingPolicy, RoutingTable,
};
pub use schema::{policy_schema, validate_policy_schema};
