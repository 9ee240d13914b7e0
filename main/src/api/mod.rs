/// Policy document model.
pub mod config;
/// Export data model consumed by report emitters.
pub mod export;
/// Fact model: type references, class/method/field facts, dependency edges,
/// and the frozen fact index.
pub mod facts;
/// Capability traits: rules and exporters.
pub mod traits;
/// Findings, severities, structured error records, and the engine result.
pub mod types;
