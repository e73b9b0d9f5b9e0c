// Work log domain components.
//
// Structure
// - week.rs: fixed logging window and week buckets
// - model.rs: typed store records
// - rules.rs: business rules and attachment policy
// - commands.rs: write intents
// - snapshot.rs: pure mutations of the in-memory snapshot
// - schema.rs: validation of raw store contents
// - filter.rs: read-side queries

pub mod commands;
pub mod filter;
pub mod model;
pub mod rules;
pub mod schema;
pub mod snapshot;
pub mod week;
