//! 运行时状态模块
//!
//! 一次 rollout 的阶段、主机与失败记录

pub mod rollout_state;

pub use rollout_state::RolloutState;
