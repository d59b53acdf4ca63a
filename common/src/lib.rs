pub mod build_config;
pub mod build_id;
pub mod config;
pub mod errors;
pub mod state;

pub use crate::build_id::{BuildId, BuildMachine, PackageId, Toolchain};
pub use crate::state::{BuildState, ForceState, ResultStatus};
