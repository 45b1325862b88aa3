//! Stepwise - 分步任务指导的步骤信念追踪与视觉回退
//!
//! 模块划分：
//! - **agent**: 对外接口（query / observe / get_belief）与组装
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态追踪、意图识别、回退决策、回退编排、查询编排、错误类型
//! - **knowledge**: 任务/步骤定义与只读知识库（TOML 目录）
//! - **matcher**: 分词与观察文本 → 步骤匹配
//! - **observability**: 日志初始化
//! - **vision**: 视觉模型客户端（HTTP / Mock）与最近一帧缓存

pub mod agent;
pub mod config;
pub mod core;
pub mod knowledge;
pub mod matcher;
pub mod observability;
pub mod vision;

pub use agent::{create_agent_from_config, Agent, BeliefView, ObserveResponse, QueryResponse};
