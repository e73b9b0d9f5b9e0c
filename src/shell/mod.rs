// Composition root for the work log.
//
// Responsibilities
// - Read config from environment.
// - Instantiate the file backed stores.
// - Wire them into the repository, command handlers and query port.

pub mod config;
pub mod state;
