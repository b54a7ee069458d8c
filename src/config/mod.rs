//! Configuration module for gatepush.
//!
//! Push jobs are configured programmatically through [`PushJobConfig`];
//! the binary builds one from environment variables via [`PushEnvConfig`].

mod push_config;

pub use push_config::{PushEnvConfig, PushJobConfig};
