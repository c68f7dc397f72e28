//! SSH 客户端实现
//!
//! 基于 russh：命令执行走 exec 通道，文件传输走 sftp 子系统。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::local::write_private;
use super::transport::{RemoteSession, RemoteTransport, TransportError};
use crate::domain::{AuthMethod, CommandOutput, Credentials, Host};

/// 保活间隔（秒），远程命令可能长时间无输出
const KEEPALIVE_INTERVAL_SECS: u64 = 30;

/// russh 客户端传输
pub struct SshTransport {
    config: Arc<client::Config>,
    /// 预先加载的私钥，所有会话共享
    key: Option<Arc<KeyPair>>,
    strict_host_keys: bool,
}

impl SshTransport {
    /// 创建传输，密钥认证时在这里加载私钥
    pub fn new(credentials: &Credentials, strict_host_keys: bool) -> Result<Self, TransportError> {
        let key = match &credentials.auth {
            AuthMethod::PrivateKey { path, passphrase } => {
                info!(key_file = %path.display(), "Loading SSH private key");
                Some(Arc::new(russh_keys::load_secret_key(
                    path,
                    passphrase.as_deref(),
                )?))
            }
            AuthMethod::Password(_) => None,
        };

        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(KEEPALIVE_INTERVAL_SECS)),
            ..Default::default()
        };

        Ok(Self {
            config: Arc::new(config),
            key,
            strict_host_keys,
        })
    }

    fn key_for(&self, path: &Path, passphrase: Option<&str>) -> Result<Arc<KeyPair>, TransportError> {
        match self.key {
            Some(ref key) => Ok(key.clone()),
            None => Ok(Arc::new(russh_keys::load_secret_key(path, passphrase)?)),
        }
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn connect(
        &self,
        host: &Host,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteSession>, TransportError> {
        let handler = ClientHandler {
            host: host.address.clone(),
            port: host.port,
            strict_host_keys: self.strict_host_keys,
        };

        let mut handle = client::connect(
            self.config.clone(),
            (host.address.as_str(), host.port),
            handler,
        )
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

        let authenticated = match &credentials.auth {
            AuthMethod::Password(password) => {
                handle
                    .authenticate_password(credentials.username.as_str(), password.as_str())
                    .await?
            }
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = self.key_for(path, passphrase.as_deref())?;
                handle
                    .authenticate_publickey(credentials.username.as_str(), key)
                    .await?
            }
        };

        if !authenticated {
            warn!(host = %host.address, user = %credentials.username, "SSH authentication rejected");
            return Err(TransportError::AuthRejected {
                user: credentials.username.clone(),
            });
        }

        debug!(host = %host.address, user = %credentials.username, "SSH session established");
        Ok(Box::new(SshSession {
            host: host.address.clone(),
            handle,
        }))
    }
}

/// 客户端回调，只负责主机密钥校验
struct ClientHandler {
    host: String,
    port: u16,
    strict_host_keys: bool,
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();

        if !self.strict_host_keys {
            debug!(host = %self.host, fingerprint = %fingerprint, "Accepting SSH host key");
            return Ok(true);
        }

        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(host = %self.host, fingerprint = %fingerprint, "Host key not present in known_hosts");
                Ok(false)
            }
            Err(e) => {
                warn!(host = %self.host, fingerprint = %fingerprint, error = %e, "Host key verification failed");
                Ok(false)
            }
        }
    }
}

/// 单台主机上的 SSH 会话
pub struct SshSession {
    host: String,
    handle: Handle<ClientHandler>,
}

impl SshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                // ext == 1 是 SSH_EXTENDED_DATA_STDERR
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                    stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        Ok(CommandOutput {
            success: exit_status == Some(0),
            exit_status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn sftp(&self) -> Result<SftpSession, TransportError> {
        let channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        Ok(SftpSession::new(channel.into_stream()).await?)
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(
        &mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, TransportError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.exec(command))
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.exec(command).await,
        }
    }

    async fn put_file(&mut self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let data = tokio::fs::read(local).await?;
        let sftp = self.sftp().await?;
        let mut file = sftp.create(remote).await?;
        file.write_all(&data).await?;
        file.shutdown().await?;
        debug!(host = %self.host, local = %local.display(), remote = %remote, bytes = data.len(), "Uploaded file");
        Ok(())
    }

    async fn get_file(&mut self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let sftp = self.sftp().await?;
        let data = sftp.read(remote).await?;
        write_private(local, &data).await?;
        debug!(host = %self.host, local = %local.display(), remote = %remote, bytes = data.len(), "Downloaded file");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}
