//! Process configuration for hops
//!
//! Configuration is read from `<dir>/config.yaml`, overlaid with
//! `<dir>/config.<tag>.yaml` when a tag is given, then overridden by `HOPS_*`
//! environment variables. Every setting has a default, so no file is needed.
//!
//! # Example
//!
//! ```ignore
//! use hops_config::HopsConfig;
//!
//! let config = HopsConfig::load(Path::new("/etc/hops"), Some("prod"))?;
//! println!("{}", config.runner.account_id);
//! ```

mod config;
mod error;

pub use config::{HopsConfig, HttpConfig, RunnerConfig, CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
