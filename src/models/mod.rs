mod alerts;
mod audit;
mod deployments;
mod devices;
mod policies;
mod policy_config;

pub use alerts::*;
pub use audit::*;
pub use deployments::*;
pub use devices::*;
pub use policies::*;
pub use policy_config::*;
