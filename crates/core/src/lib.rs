pub mod config;
pub mod entity;
pub mod error;
pub mod feature;

pub use config::Config;
pub use entity::*;
pub use error::*;
pub use feature::*;
