//! 匹配层：分词与观察文本 → 步骤的相似度匹配

mod step_matcher;
pub mod tokenizer;

pub use step_matcher::{
    ConfidenceBand, ConfidenceBands, MatchResult, ObservationMatcher, StepMatcher,
};
