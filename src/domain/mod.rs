//! 领域模型模块
//!
//! 纯数据结构，不依赖 tokio / russh

pub mod artifact;
pub mod execution;
pub mod host;
pub mod rollout;

// Re-exports for convenience
pub use artifact::JoinArtifact;
pub use execution::{
    BatchReport, CommandBatch, CommandOutput, ExecutionResult, FileTransfer, RemoteCommand,
    TransferDirection, TransferResult,
};
pub use host::{assign_roles, AuthMethod, Credentials, Host, NodeRole, Reachability};
pub use rollout::{
    CommandFailure, HostSummary, Phase, PhaseRecord, PhaseStatus, RolloutSummary,
};
