//! 会话管理
//!
//! 带固定间隔重试地打开远程会话。每个成功打开的会话必须且只能 `close()` 一次，
//! `close` 消费 `Session`，未关闭就被丢弃时会打一条警告。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::domain::{CommandOutput, Credentials, Host, RemoteCommand};
use crate::error::{BootstrapError, BootstrapResult};
use crate::infra::{RemoteSession, RemoteTransport, TransportError};

/// 绑定到一台主机的会话
pub struct Session {
    host: String,
    inner: Box<dyn RemoteSession>,
    command_timeout: Option<Duration>,
    closed: bool,
}

impl Session {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 执行命令，超时为 `None` 时一直等到远程命令结束
    pub async fn run(&mut self, command: &RemoteCommand) -> Result<CommandOutput, TransportError> {
        self.inner.run(command.script(), self.command_timeout).await
    }

    pub async fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), TransportError> {
        self.inner.put_file(local, remote).await
    }

    pub async fn get_file(&mut self, local: &Path, remote: &str) -> Result<(), TransportError> {
        self.inner.get_file(local, remote).await
    }

    /// 关闭会话；关闭失败只记录日志
    pub async fn close(mut self) {
        self.closed = true;
        match self.inner.close().await {
            Ok(()) => debug!(host = %self.host, "Session closed"),
            Err(e) => warn!(host = %self.host, error = %e, "Failed to close session cleanly"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            warn!(host = %self.host, "Session dropped without close");
        }
    }
}

/// 会话管理器
///
/// 持有进程内共享的只读凭据和重试策略。
#[derive(Clone)]
pub struct SessionManager {
    transport: Arc<dyn RemoteTransport>,
    credentials: Arc<Credentials>,
    retry: RetryPolicy,
    command_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        credentials: Arc<Credentials>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            credentials,
            retry,
            command_timeout: None,
            cancel,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// 按默认重试次数打开会话
    pub async fn open(&self, host: &Host) -> BootstrapResult<Session> {
        self.open_with_attempts(host, self.retry.max_attempts).await
    }

    /// 最多尝试 `max_attempts` 次，失败之间固定等待 `retry.interval`
    ///
    /// 次数耗尽返回 `BootstrapError::Connect`，是否放弃这台主机由调用方决定。
    /// 已取消时直接返回 `BootstrapError::Cancelled`。
    pub async fn open_with_attempts(
        &self,
        host: &Host,
        max_attempts: u32,
    ) -> BootstrapResult<Session> {
        // 取消后不再建立新会话，也就不会再下发新的批次
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled);
        }

        let max_attempts = max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            info!(host = %host.address, attempt, max_attempts, "Connecting");

            match self.transport.connect(host, &self.credentials).await {
                Ok(inner) => {
                    return Ok(Session {
                        host: host.address.clone(),
                        inner,
                        command_timeout: self.command_timeout,
                        closed: false,
                    });
                }
                Err(e) => {
                    warn!(host = %host.address, attempt, error = %e, "Connection attempt failed");
                    let give_up = e.is_auth_failure() && !self.retry.retry_auth_failures;
                    last_error = e.to_string();
                    if give_up {
                        return Err(BootstrapError::Connect {
                            host: host.address.clone(),
                            attempts: attempt,
                            last_error,
                        });
                    }
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(BootstrapError::Cancelled),
                    _ = tokio::time::sleep(self.retry.interval) => {}
                }
            }
        }

        Err(BootstrapError::Connect {
            host: host.address.clone(),
            attempts: max_attempts,
            last_error,
        })
    }
}
