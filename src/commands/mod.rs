// ABOUTME: Command implementations for the bridge CLI
// ABOUTME: Exports poll, inbound apply/note, state, snapshot, and status commands

pub mod inbound;
pub mod poll;
pub mod snapshot;
pub mod state;
pub mod status;

pub use inbound::{apply, note, read_payload};
pub use poll::poll;
pub use snapshot::snapshot;
pub use state::{command as state, StateArgs};
pub use status::status;
