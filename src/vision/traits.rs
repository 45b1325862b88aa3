//! 视觉模型客户端抽象
//!
//! 所有后端（HTTP 视觉服务 / Mock）实现 VisionClient：chat（可带一张图片）、读取与设置人设。
//! 人设是远端服务上的全局可变状态，调用方负责串行化 swap / restore。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::VisionError;
use crate::vision::CachedFrame;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// 人设令牌：视觉服务当前使用的系统提示/模式，原样保存以便恢复
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaToken(pub String);

impl PersonaToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PersonaToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 人设可能很长，日志里只显示前 48 个字符
        let preview: String = self.0.chars().take(48).collect();
        if preview.len() < self.0.len() {
            write!(f, "{}…", preview)
        } else {
            write!(f, "{}", preview)
        }
    }
}

#[async_trait]
pub trait VisionClient: Send + Sync {
    /// 对话；image 为 None 时纯文本
    async fn chat(
        &self,
        messages: &[Message],
        image: Option<&CachedFrame>,
        max_tokens: u32,
    ) -> Result<String, VisionError>;

    async fn get_persona(&self) -> Result<PersonaToken, VisionError>;

    async fn set_persona(&self, persona: &PersonaToken) -> Result<(), VisionError>;
}
