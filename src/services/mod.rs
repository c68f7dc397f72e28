//! 服务层模块
//!
//! 会话管理、批次执行、join 命令中继与阶段编排

pub mod batch;
pub mod orchestrator;
pub mod relay;
pub mod session;

pub use batch::BatchExecutor;
pub use orchestrator::{write_summary, RoleOrchestrator};
pub use relay::{ArtifactRelay, DistributionReport};
pub use session::{Session, SessionManager};
