//! 主机与凭据领域模型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 节点角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::ControlPlane => "control-plane",
            NodeRole::Worker => "worker",
        }
    }
}

/// 主机可达状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachability {
    #[default]
    Unknown,
    Connected,
    Failed,
}

/// 集群中的一台主机
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// 网络地址（IP 或主机名）
    pub address: String,
    /// SSH 端口
    pub port: u16,
    pub role: NodeRole,
}

impl Host {
    pub fn new(address: impl Into<String>, port: u16, role: NodeRole) -> Self {
        Self {
            address: address.into(),
            port,
            role,
        }
    }

    pub fn is_control_plane(&self) -> bool {
        self.role == NodeRole::ControlPlane
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// 按配置顺序分配角色：第一个地址是控制平面，其余都是 worker
pub fn assign_roles<S: AsRef<str>>(addresses: &[S], port: u16) -> Vec<Host> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, addr)| {
            let role = if i == 0 {
                NodeRole::ControlPlane
            } else {
                NodeRole::Worker
            };
            Host::new(addr.as_ref(), port, role)
        })
        .collect()
}

/// SSH 认证方式
#[derive(Clone)]
pub enum AuthMethod {
    Password(String),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

/// 登录凭据，进程内只读共享
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub auth: AuthMethod,
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            auth: AuthMethod::Password(password.into()),
        }
    }

    pub fn private_key(
        username: impl Into<String>,
        path: impl Into<PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            auth: AuthMethod::PrivateKey {
                path: path.into(),
                passphrase,
            },
        }
    }
}

// 密码和密钥口令不进日志
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let auth = match &self.auth {
            AuthMethod::Password(_) => "password(***)".to_string(),
            AuthMethod::PrivateKey { path, .. } => format!("private_key({})", path.display()),
        };
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("auth", &auth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_address_is_control_plane() {
        let hosts = assign_roles(&["10.0.0.1", "10.0.0.2", "10.0.0.3"], 22);
        assert_eq!(hosts.len(), 3);
        assert!(hosts[0].is_control_plane());
        assert_eq!(hosts[1].role, NodeRole::Worker);
        assert_eq!(hosts[2].role, NodeRole::Worker);
        assert_eq!(
            hosts.iter().filter(|h| h.is_control_plane()).count(),
            1
        );
    }

    #[test]
    fn test_single_host_is_control_plane_only() {
        let hosts = assign_roles(&["node-a"], 2222);
        assert_eq!(hosts, vec![Host::new("node-a", 2222, NodeRole::ControlPlane)]);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::password("root", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("root"));
        assert!(!debug.contains("hunter2"));
    }
}
