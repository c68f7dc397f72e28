//! 基础设施模块
//!
//! 封装外部依赖（SSH 传输）

pub mod local;
pub mod ssh;
pub mod transport;

#[cfg(test)]
pub mod mock;

pub use ssh::SshTransport;
pub use transport::{RemoteSession, RemoteTransport, TransportError};
