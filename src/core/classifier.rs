//! 查询意图识别
//!
//! 中英文关键词/短语匹配，不调用 LLM，也不读取信念状态。
//! 未命中任何规则时返回 Unknown，这是最主要的回退触发条件。

use serde::{Deserialize, Serialize};

use crate::matcher::tokenizer::contains_cjk;

/// 查询类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    /// 我在哪一步
    Progress,
    /// 下一步做什么
    NextStep,
    /// 需要什么工具
    Tools,
    /// 助手能做什么
    Capabilities,
    Unknown,
}

/// 查询语言（决定模板回复使用的语言）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    Zh,
}

pub fn detect_locale(query: &str) -> Locale {
    if contains_cjk(query) {
        Locale::Zh
    } else {
        Locale::En
    }
}

/// 关键词意图分类器
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryClassifier;

impl QueryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 按「更具体的意图优先」顺序匹配
    pub fn classify(&self, query: &str) -> QueryType {
        let content = normalize(query);
        if content.is_empty() {
            return QueryType::Unknown;
        }

        if Self::contains_capability_keywords(&content) {
            return QueryType::Capabilities;
        }
        if Self::contains_next_step_keywords(&content) {
            return QueryType::NextStep;
        }
        if Self::contains_tools_keywords(&content) {
            return QueryType::Tools;
        }
        if Self::contains_progress_keywords(&content) {
            return QueryType::Progress;
        }
        QueryType::Unknown
    }

    fn contains_capability_keywords(content: &str) -> bool {
        let keywords = [
            "what can you do",
            "what can you help",
            "how can you help",
            "what are you able",
            "capabilit",
            "who are you",
            "你能做什么",
            "你可以做什么",
            "你会什么",
            "你能帮我什么",
            "你是谁",
            "功能",
        ];
        keywords.iter().any(|k| content.contains(k))
    }

    fn contains_next_step_keywords(content: &str) -> bool {
        let keywords = [
            "next step",
            "what's next",
            "whats next",
            "what next",
            "what now",
            "then what",
            "what do i do next",
            "what should i do",
            "what comes after",
            "after this",
            "下一步",
            "接下来",
            "然后呢",
            "之后做什么",
            "该做什么",
        ];
        keywords.iter().any(|k| content.contains(k))
    }

    fn contains_tools_keywords(content: &str) -> bool {
        let keywords = [
            "tool",
            "equipment",
            "utensil",
            "what do i need",
            "what will i need",
            "do i need",
            "工具",
            "器具",
            "设备",
            "需要什么",
            "要用什么",
        ];
        keywords.iter().any(|k| content.contains(k))
    }

    fn contains_progress_keywords(content: &str) -> bool {
        let keywords = [
            "what step",
            "which step",
            "where am i",
            "am i on",
            "am i at",
            "progress",
            "how far",
            "current step",
            "what am i doing",
            "哪一步",
            "哪个步骤",
            "第几步",
            "进度",
            "进行到",
            "现在在做什么",
            "做到哪",
        ];
        keywords.iter().any(|k| content.contains(k))
    }
}

/// 小写化、统一撇号、合并空白
fn normalize(query: &str) -> String {
    query
        .to_lowercase()
        .replace(['\u{2019}', '\u{2018}'], "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
