//! CLI command handling

pub mod commit;
pub mod run;

pub use commit::*;
pub use run::*;
