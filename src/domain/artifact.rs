//! Join 命令
//!
//! `kubeadm init` 输出的 worker join 命令。其中带有引导 token，
//! `Debug` 和 `Display` 只输出脱敏后的形式。

use std::fmt;

/// 取值需要脱敏的参数
const SECRET_FLAGS: [&str; 3] = ["--token", "--discovery-token-ca-cert-hash", "--certificate-key"];

/// 捕获到的 worker join 命令
///
/// 只能通过 [`JoinArtifact::extract`] 构造，拿到实例即说明控制平面给出了可用的 join 命令。
#[derive(Clone, PartialEq, Eq)]
pub struct JoinArtifact {
    command: String,
}

impl JoinArtifact {
    /// 从 `kubeadm init` 输出中找出 worker join 命令
    ///
    /// 支持单行形式和以 `\` 续行的多行形式，跳过控制平面的 join 命令。
    pub fn extract(output: &str, marker: &str) -> Option<Self> {
        let lines: Vec<&str> = output.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let Some(pos) = lines[i].find(marker) else {
                i += 1;
                continue;
            };

            let mut parts = Vec::new();
            let mut current = lines[i][pos..].trim();
            loop {
                match current.strip_suffix('\\') {
                    Some(head) => {
                        parts.push(head.trim().to_string());
                        i += 1;
                        match lines.get(i) {
                            Some(next) => current = next.trim(),
                            None => break,
                        }
                    }
                    None => {
                        parts.push(current.to_string());
                        break;
                    }
                }
            }
            i += 1;

            let command = parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if command.contains("--control-plane") || !command.contains("--token") {
                continue;
            }
            return Some(Self { command });
        }
        None
    }

    /// 完整命令，包含 token
    pub fn command(&self) -> &str {
        &self.command
    }

    /// 在远程主机上把命令写入 `path` 的脚本
    pub fn persist_script(&self, path: &str) -> String {
        format!(
            "printf '%s\\n' {} > {} && chmod 600 {}",
            sh_quote(&self.command),
            path,
            path
        )
    }

    /// 隐藏 token 等参数值后的命令
    pub fn redacted(&self) -> String {
        let mut out = Vec::new();
        let mut hide_next = false;
        for word in self.command.split_whitespace() {
            if hide_next {
                out.push("***");
                hide_next = false;
                continue;
            }
            out.push(word);
            hide_next = SECRET_FLAGS.contains(&word);
        }
        out.join(" ")
    }
}

impl fmt::Debug for JoinArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinArtifact")
            .field("command", &self.redacted())
            .finish()
    }
}

impl fmt::Display for JoinArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// 按 POSIX sh 规则加单引号
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
