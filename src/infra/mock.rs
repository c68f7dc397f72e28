//! 内存传输实现（仅测试）
//!
//! 按全局顺序记录每一次调用，用于断言阶段顺序和会话关闭。

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::local::write_private;
use super::transport::{RemoteSession, RemoteTransport, TransportError};
use crate::domain::{CommandOutput, Credentials, Host};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallKind {
    Connect,
    Run(String),
    Put(String),
    Get(String),
    Close,
}

#[derive(Clone, Debug)]
pub struct Call {
    pub seq: usize,
    pub host: String,
    pub kind: CallKind,
}

struct Rule {
    host: Option<String>,
    needle: String,
    output: CommandOutput,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    connect_attempts: HashMap<String, u32>,
    /// 前 N 次连接失败；u32::MAX 表示永远失败
    connect_failures: HashMap<String, u32>,
    auth_rejected: HashSet<String>,
    rules: Vec<Rule>,
    files: HashMap<String, String>,
}

impl Inner {
    fn record(&mut self, host: &str, kind: CallKind) {
        let seq = self.calls.len();
        self.calls.push(Call {
            seq,
            host: host.to_string(),
            kind,
        });
    }
}

#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(self, host: &str) -> Self {
        self.flaky(host, u32::MAX)
    }

    pub fn flaky(self, host: &str, failures: u32) -> Self {
        self.inner
            .lock()
            .unwrap()
            .connect_failures
            .insert(host.to_string(), failures);
        self
    }

    pub fn reject_auth(self, host: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .auth_rejected
            .insert(host.to_string());
        self
    }

    /// 命令包含 `needle` 时返回 `output`，先注册的规则优先
    pub fn respond(self, host: Option<&str>, needle: &str, output: CommandOutput) -> Self {
        self.inner.lock().unwrap().rules.push(Rule {
            host: host.map(str::to_string),
            needle: needle.to_string(),
            output,
        });
        self
    }

    pub fn remote_file(self, remote: &str, content: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert(remote.to_string(), content.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn connect_attempts(&self, host: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .connect_attempts
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.host == host)
            .filter_map(|c| match c.kind {
                CallKind::Run(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    /// 第一个满足条件的调用序号
    pub fn first_seq(&self, host: &str, pred: impl Fn(&CallKind) -> bool) -> Option<usize> {
        self.calls()
            .into_iter()
            .find(|c| c.host == host && pred(&c.kind))
            .map(|c| c.seq)
    }

    pub fn count(&self, host: &str, kind: &CallKind) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.host == host && &c.kind == kind)
            .count()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn connect(
        &self,
        host: &Host,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteSession>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let attempt = {
            let counter = inner
                .connect_attempts
                .entry(host.address.clone())
                .or_insert(0);
            *counter += 1;
            *counter
        };
        inner.record(&host.address, CallKind::Connect);

        if let Some(&failures) = inner.connect_failures.get(&host.address) {
            if attempt <= failures {
                return Err(TransportError::Connect(format!(
                    "connection refused ({})",
                    host.address
                )));
            }
        }
        if inner.auth_rejected.contains(&host.address) {
            return Err(TransportError::AuthRejected {
                user: credentials.username.clone(),
            });
        }

        Ok(Box::new(MockSession {
            host: host.address.clone(),
            inner: self.inner.clone(),
        }))
    }
}

struct MockSession {
    host: String,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn run(
        &mut self,
        command: &str,
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.record(&self.host, CallKind::Run(command.to_string()));
        let output = inner
            .rules
            .iter()
            .find(|r| {
                r.host.as_deref().map_or(true, |h| h == self.host) && command.contains(&r.needle)
            })
            .map(|r| r.output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }

    async fn put_file(&mut self, _local: &Path, remote: &str) -> Result<(), TransportError> {
        self.inner
            .lock()
            .unwrap()
            .record(&self.host, CallKind::Put(remote.to_string()));
        Ok(())
    }

    async fn get_file(&mut self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let content = {
            let mut inner = self.inner.lock().unwrap();
            inner.record(&self.host, CallKind::Get(remote.to_string()));
            inner.files.get(remote).cloned()
        };
        match content {
            Some(content) => {
                write_private(local, content.as_bytes()).await?;
                Ok(())
            }
            None => Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", remote),
            ))),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner
            .lock()
            .unwrap()
            .record(&self.host, CallKind::Close);
        Ok(())
    }
}
