//! 命令批次与执行结果

use serde::Serialize;

use super::rollout::Phase;

/// 远程 shell 命令
///
/// `label` 存在时日志和结果里只出现 label，不出现脚本本身。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteCommand {
    script: String,
    label: Option<String>,
}

impl RemoteCommand {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            label: None,
        }
    }

    /// 带敏感内容的命令（例如包含 join token）
    pub fn sensitive(script: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            label: Some(label.into()),
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn is_sensitive(&self) -> bool {
        self.label.is_some()
    }

    /// 可以安全打印的形式
    pub fn display(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.script)
    }
}

impl From<&str> for RemoteCommand {
    fn from(script: &str) -> Self {
        Self::new(script)
    }
}

impl From<String> for RemoteCommand {
    fn from(script: String) -> Self {
        Self::new(script)
    }
}

/// 某一阶段在一台主机上顺序执行的命令
#[derive(Clone, Debug)]
pub struct CommandBatch {
    pub phase: Phase,
    pub commands: Vec<RemoteCommand>,
}

impl CommandBatch {
    pub fn new<I, C>(phase: Phase, commands: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<RemoteCommand>,
    {
        Self {
            phase,
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// 传输层返回的原始输出
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_status: Option<u32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_status: u32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_status: Some(exit_status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// 单条命令的执行结果
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionResult {
    /// 命令的可打印形式
    pub command: String,
    pub success: bool,
    pub exit_status: Option<u32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn from_output(command: &RemoteCommand, output: CommandOutput, duration_ms: u64) -> Self {
        Self {
            command: command.display().to_string(),
            success: output.success,
            exit_status: output.exit_status,
            stdout: output.stdout.trim().to_string(),
            stderr: output.stderr.trim().to_string(),
            duration_ms,
        }
    }

    /// 会话在命令执行途中出错
    pub fn transport_failure(command: &RemoteCommand, error: impl ToString, duration_ms: u64) -> Self {
        Self {
            command: command.display().to_string(),
            success: false,
            exit_status: None,
            stdout: String::new(),
            stderr: error.to_string(),
            duration_ms,
        }
    }
}

/// 一个批次在一台主机上的全部结果，顺序与命令顺序一致
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub host: String,
    pub phase: Phase,
    pub results: Vec<ExecutionResult>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// 文件传输方向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Put,
    Get,
}

/// 本地路径与远程路径之间的一次文件传输
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileTransfer {
    pub direction: TransferDirection,
    pub local: std::path::PathBuf,
    pub remote: String,
}

impl FileTransfer {
    pub fn put(local: impl Into<std::path::PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            direction: TransferDirection::Put,
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn get(remote: impl Into<String>, local: impl Into<std::path::PathBuf>) -> Self {
        Self {
            direction: TransferDirection::Get,
            local: local.into(),
            remote: remote.into(),
        }
    }
}

/// 文件传输结果
#[derive(Clone, Debug, Serialize)]
pub struct TransferResult {
    pub direction: TransferDirection,
    pub local: std::path::PathBuf,
    pub remote: String,
    pub success: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_command_display() {
        let cmd = RemoteCommand::sensitive("echo secret-token > /tmp/x", "persist join command");
        assert_eq!(cmd.display(), "persist join command");
        assert!(cmd.script().contains("secret-token"));

        let plain = RemoteCommand::new("swapoff -a");
        assert_eq!(plain.display(), "swapoff -a");
    }

    #[test]
    fn test_execution_result_trims_output() {
        let cmd = RemoteCommand::new("hostname");
        let result = ExecutionResult::from_output(&cmd, CommandOutput::ok("node-1\n"), 3);
        assert!(result.success);
        assert_eq!(result.stdout, "node-1");
        assert_eq!(result.command, "hostname");
    }

    #[test]
    fn test_batch_report_failures() {
        let cmd = RemoteCommand::new("false");
        let report = BatchReport {
            host: "10.0.0.2".to_string(),
            phase: Phase::Provision,
            results: vec![
                ExecutionResult::from_output(&cmd, CommandOutput::ok(""), 1),
                ExecutionResult::from_output(&cmd, CommandOutput::failed(1, "boom"), 1),
            ],
        };
        assert!(!report.all_succeeded());
        assert_eq!(report.failure_count(), 1);
    }
}
