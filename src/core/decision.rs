//! 回退决策：本次查询能否直接用信念回答
//!
//! 按顺序取第一条命中的规则：无信念 → 意图未知 → 置信度低于阈值 → 否则直接回答。
//! 无状态，每次查询重新计算，不做滞回。

use serde::Serialize;

use crate::core::classifier::{QueryClassifier, QueryType};
use crate::core::state::BeliefState;

/// 触发回退的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    NoBelief,
    UnknownIntent,
    LowConfidence,
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackPolicy {
    classifier: QueryClassifier,
    confidence_threshold: f32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::new(0.40)
    }
}

impl FallbackPolicy {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            classifier: QueryClassifier::new(),
            confidence_threshold,
        }
    }

    pub fn decide(&self, query: &str, belief: Option<&BeliefState>) -> Option<FallbackReason> {
        let Some(belief) = belief else {
            return Some(FallbackReason::NoBelief);
        };
        if self.classifier.classify(query) == QueryType::Unknown {
            return Some(FallbackReason::UnknownIntent);
        }
        if belief.confidence < self.confidence_threshold {
            return Some(FallbackReason::LowConfidence);
        }
        None
    }

    pub fn should_fallback(&self, query: &str, belief: Option<&BeliefState>) -> bool {
        self.decide(query, belief).is_some()
    }
}
