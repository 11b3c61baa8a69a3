pub mod error;
pub mod config;
pub mod platform;

pub use config::BsonConfig;
pub use error::{MikuError, MikuResult};
pub use platform::HostIdentity;
