//! Versioned, typed decision configuration: editable records with an
//! at-most-one-active-per-type invariant, plus typed views with documented
//! defaults used when no record is active.

mod schema;
mod store;

pub use schema::{
    BadDebtWeights, BusinessRuleWeights, ClusteringParams, ConfigType, recognized_keys,
};
pub use store::{
    ConfigSnapshot, ConfigStoreError, Configuration, ConfigurationDraft, ConfigurationStore,
};
