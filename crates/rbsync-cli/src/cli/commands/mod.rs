//! Command handlers.
//!
//! Each handler returns whether the command succeeded; `main` maps that to
//! the process exit code.

pub mod doctor;
pub mod helpers;
pub mod history;
pub mod lookup;
pub mod prune;
pub mod reconcile;

pub use doctor::run_doctor;
pub use history::{run_find, run_history};
pub use lookup::{run_groups, run_users};
pub use prune::run_prune;
pub use reconcile::run_reconcile;
