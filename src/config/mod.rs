//! 配置模块
//!
//! 命令行解析、命令清单与常量

pub mod cli;
pub mod constants;
pub mod playbook;
pub mod rollout;

pub use cli::CliArgs;
pub use playbook::Playbook;
pub use rollout::{RetryPolicy, RolloutConfig};
