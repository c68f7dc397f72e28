//! XJP Kube Bootstrap - 通过 SSH 将裸机引导为 Kubernetes 集群
//!
//! 第一台主机初始化为控制平面，其余主机作为 worker 加入。
//! 远程传输通过 `infra::RemoteTransport` 抽象，默认实现基于 russh。

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod state;

pub use config::{CliArgs, RolloutConfig};
pub use error::{BootstrapError, BootstrapResult};
pub use services::{write_summary, RoleOrchestrator};
