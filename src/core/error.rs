//! 错误类型
//!
//! 可恢复错误在能给出合理默认值的边界处吸收（匹配器 → None；回退 → 降级回复），
//! 只有配置/知识加载错误在启动期是致命的。

use thiserror::Error;

/// 视觉模型服务调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisionError {
    #[error("Vision service unavailable: {0}")]
    Unavailable(String),

    #[error("Vision service timeout")]
    Timeout,

    #[error("Vision service returned status {0}")]
    Status(u16),

    #[error("Invalid response from vision service: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for VisionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VisionError::Timeout
        } else if let Some(status) = e.status() {
            VisionError::Status(status.as_u16())
        } else if e.is_decode() {
            VisionError::InvalidResponse(e.to_string())
        } else {
            VisionError::Unavailable(e.to_string())
        }
    }
}

/// 引擎级错误
#[derive(Error, Debug)]
pub enum StepwiseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to load task knowledge: {0}")]
    KnowledgeLoad(String),

    #[error("Invalid task knowledge: {0}")]
    InvalidKnowledge(String),

    #[error(transparent)]
    Vision(#[from] VisionError),

    /// 人设恢复失败：只记录日志，下一次回退调用会重新尝试恢复
    #[error("Persona restore failed: {0}")]
    PersonaRestore(VisionError),
}

impl From<config::ConfigError> for StepwiseError {
    fn from(e: config::ConfigError) -> Self {
        StepwiseError::Config(e.to_string())
    }
}
