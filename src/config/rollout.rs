//! Rollout 配置
//!
//! 启动时构建一次，之后只读，按 `Arc` 传给每个阶段。

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::cli::CliArgs;
use crate::config::constants::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_RETRY_INTERVAL_SECS, DEFAULT_SSH_PORT, REPO_FILE_NAME,
};
use crate::config::playbook::Playbook;
use crate::domain::{assign_roles, Credentials, Host};
use crate::error::{BootstrapError, BootstrapResult};

/// 连接重试策略：固定间隔，不做指数退避
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// 认证被拒绝时是否继续重试；默认和其他连接失败一样重试
    pub retry_auth_failures: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            retry_auth_failures: true,
        }
    }
}

/// 不可变的 rollout 配置
#[derive(Clone, Debug)]
pub struct RolloutConfig {
    /// 第一个是控制平面
    pub hosts: Vec<Host>,
    pub credentials: Credentials,
    pub retry: RetryPolicy,
    pub max_concurrency: usize,
    pub command_timeout: Option<Duration>,
    pub save_dir: PathBuf,
    pub repo_file: PathBuf,
    pub post_install: bool,
    pub strict_host_keys: bool,
    pub playbook: Playbook,
}

impl RolloutConfig {
    /// 用默认值构建，地址列表至少一个且不能重复
    pub fn new<S: AsRef<str>>(addresses: &[S], credentials: Credentials) -> BootstrapResult<Self> {
        validate_addresses(addresses)?;
        let hosts = assign_roles(addresses, DEFAULT_SSH_PORT);
        Ok(Self {
            max_concurrency: hosts.len(),
            hosts,
            credentials,
            retry: RetryPolicy::default(),
            command_timeout: None,
            save_dir: std::env::temp_dir(),
            repo_file: PathBuf::from(REPO_FILE_NAME),
            post_install: true,
            strict_host_keys: false,
            playbook: Playbook::default(),
        })
    }

    /// 从命令行参数构建并校验
    pub fn from_args(args: CliArgs) -> BootstrapResult<Self> {
        validate_addresses(&args.ips)?;

        let credentials = resolve_credentials(&args)?;

        if args.connect_attempts == 0 {
            return Err(BootstrapError::config("--connect-attempts must be at least 1"));
        }
        if args.max_concurrency == Some(0) {
            return Err(BootstrapError::config("--max-concurrency must be at least 1"));
        }

        let repo_file = match args.repo_file {
            Some(path) => path,
            None => default_repo_file()?,
        };
        if !repo_file.is_file() {
            return Err(BootstrapError::config(format!(
                "repository file not found: {}",
                repo_file.display()
            )));
        }

        let hosts = assign_roles(&args.ips, args.port);
        let max_concurrency = args.max_concurrency.unwrap_or(hosts.len());

        Ok(Self {
            hosts,
            credentials,
            retry: RetryPolicy {
                max_attempts: args.connect_attempts,
                interval: Duration::from_secs(args.retry_interval_secs),
                retry_auth_failures: !args.no_auth_retry,
            },
            max_concurrency,
            command_timeout: args.command_timeout_secs.map(Duration::from_secs),
            save_dir: args.save_dir.unwrap_or_else(std::env::temp_dir),
            repo_file,
            post_install: !args.skip_post_install,
            strict_host_keys: args.strict_host_keys,
            playbook: Playbook {
                pod_network_cidr: args.pod_network_cidr,
                ..Playbook::default()
            },
        })
    }

    /// 控制平面主机（地址列表第一个）
    pub fn control_plane(&self) -> &Host {
        &self.hosts[0]
    }

    /// 除控制平面外的所有主机，按地址比较
    pub fn workers(&self) -> impl Iterator<Item = &Host> {
        let control_plane = &self.control_plane().address;
        self.hosts.iter().filter(move |h| &h.address != control_plane)
    }
}

fn validate_addresses<S: AsRef<str>>(addresses: &[S]) -> BootstrapResult<()> {
    if addresses.is_empty() {
        return Err(BootstrapError::config("at least one host address is required"));
    }
    let mut seen = HashSet::new();
    for addr in addresses {
        let addr = addr.as_ref().trim();
        if addr.is_empty() {
            return Err(BootstrapError::config("host address must not be empty"));
        }
        if !seen.insert(addr.to_string()) {
            return Err(BootstrapError::config(format!("duplicate host address: {}", addr)));
        }
    }
    Ok(())
}

/// 私钥优先，其次密码；两者都没有则报错，不存在默认密码
fn resolve_credentials(args: &CliArgs) -> BootstrapResult<Credentials> {
    if let Some(ref path) = args.identity_file {
        if !path.is_file() {
            return Err(BootstrapError::config(format!(
                "identity file not found: {}",
                path.display()
            )));
        }
        return Ok(Credentials::private_key(
            args.username.clone(),
            path.clone(),
            args.key_passphrase.clone(),
        ));
    }

    match args.password.as_deref() {
        Some(password) if !password.is_empty() => {
            Ok(Credentials::password(args.username.clone(), password))
        }
        _ => Err(BootstrapError::config(
            "no credentials given: pass --identity-file or set KUBE_BOOTSTRAP_PASSWORD",
        )),
    }
}

/// 与可执行文件同目录的 kubernetes.repo
fn default_repo_file() -> BootstrapResult<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| BootstrapError::config("cannot determine executable directory"))?;
    Ok(dir.join(REPO_FILE_NAME))
}
