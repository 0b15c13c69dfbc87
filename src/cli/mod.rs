//! CLI command handling

pub mod connection;
pub mod control;
pub mod output;
pub mod query;
pub mod run;

pub use connection::*;
pub use control::*;
pub use output::*;
pub use query::*;
pub use run::*;
