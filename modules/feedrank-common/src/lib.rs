pub mod config;
pub mod error;
pub mod observation;
pub mod ranking;
pub mod types;

pub use config::Config;
pub use error::CollectError;
pub use observation::*;
pub use ranking::*;
pub use types::*;
