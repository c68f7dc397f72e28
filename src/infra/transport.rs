//! 远程会话接口
//!
//! 编排引擎只依赖这两个 trait；russh 实现见 `infra::ssh`，测试用内存实现见 `infra::mock`。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CommandOutput, Credentials, Host};

/// 传输层错误
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Authentication rejected for user {user}")]
    AuthRejected { user: String },

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("Key error: {0}")]
    Key(#[from] russh_keys::Error),

    #[error("SFTP error: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// 是否为认证失败（密码/密钥被拒绝）
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, TransportError::AuthRejected { .. })
    }
}

/// 建立远程会话
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// 连接并认证，单次尝试；重试由 `SessionManager` 负责
    async fn connect(
        &self,
        host: &Host,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteSession>, TransportError>;
}

/// 已认证的远程会话
#[async_trait]
pub trait RemoteSession: Send {
    /// 执行命令并收集输出，`timeout` 为 `None` 时不设上限
    async fn run(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, TransportError>;

    /// 上传本地文件
    async fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// 下载远程文件到本地
    async fn get_file(&mut self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// 关闭会话
    async fn close(&mut self) -> Result<(), TransportError>;
}
