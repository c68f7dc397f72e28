//! 统一错误处理
//!
//! 所有阶段操作统一返回 `BootstrapResult<T>`。
//! 命令失败是 `BatchReport` 里的值，不是错误；只有连接失败会让单台主机退出，
//! 只有 `Severity::Fatal` 的错误会终止整个 rollout。

use thiserror::Error;

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// 记录后跳过该主机，其他主机继续
    Recoverable,
    /// 终止整个 rollout
    Fatal,
}

/// 引导过程中的错误
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// 重试次数耗尽仍无法连接主机
    #[error("Unable to connect to {host} after {attempts} attempt(s): {last_error}")]
    Connect {
        host: String,
        attempts: u32,
        last_error: String,
    },

    /// 主机任务异常退出（panic）
    #[error("Task for {host} ended abnormally: {reason}")]
    HostTask { host: String, reason: String },

    /// 控制平面输出中找不到 join 标记
    #[error("Join artifact not found in control-plane output (marker: {marker:?})")]
    ArtifactCapture { marker: String },

    /// 控制平面初始化失败
    #[error("Control-plane initialization failed on {host}: {reason}")]
    ControlPlaneInit { host: String, reason: String },

    /// Provision 阶段没有任何主机可达
    #[error("No hosts were reachable during provisioning")]
    NoReachableHosts,

    /// 被外部取消
    #[error("Rollout was cancelled")]
    Cancelled,

    /// 配置无效
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// 创建配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// 创建控制平面初始化错误
    pub fn control_plane(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ControlPlaneInit {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// 错误的严重程度
    ///
    /// 连接失败本身是可恢复的，控制平面连接失败由编排器升级为 `ControlPlaneInit`。
    pub fn severity(&self) -> Severity {
        match self {
            BootstrapError::Connect { .. } | BootstrapError::HostTask { .. } => {
                Severity::Recoverable
            }
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// 进程退出码
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::Config(_) | BootstrapError::Io(_) => 1,
            BootstrapError::NoReachableHosts => 2,
            BootstrapError::ArtifactCapture { .. } | BootstrapError::ControlPlaneInit { .. } => 3,
            BootstrapError::Cancelled => 130,
            BootstrapError::Connect { .. } | BootstrapError::HostTask { .. } => 1,
        }
    }
}

/// 便捷类型别名
pub type BootstrapResult<T> = Result<T, BootstrapError>;
