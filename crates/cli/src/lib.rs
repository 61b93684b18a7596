// cli/src/lib.rs
pub mod config;
pub mod runtime;

pub use config::ProjectConfig;
pub use runtime::{DeploymentRecord, Session, Signer};
