//! 步骤匹配：观察文本 → 最相似的步骤
//!
//! 启动时为每个步骤预先分词（视觉线索 / 标题+描述 / 工具），匹配时只对观察文本分词一次。
//! 纯函数，无副作用；知识库为空时返回 None。

use std::collections::HashSet;

use serde::Serialize;

use crate::knowledge::{KnowledgeStore, StepDefinition};
use crate::matcher::tokenizer::{containment, dice_similarity, tokenize_to_set};

const CUE_WEIGHT: f32 = 0.55;
const TEXT_WEIGHT: f32 = 0.25;
const TOOLS_WEIGHT: f32 = 0.20;

/// 置信度分档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

/// 分档阈值（来自配置 [matcher]）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBands {
    pub high: f32,
    pub medium: f32,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            high: 0.70,
            medium: 0.40,
        }
    }
}

impl ConfidenceBands {
    pub fn band_for(&self, similarity: f32) -> ConfidenceBand {
        if similarity >= self.high {
            ConfidenceBand::High
        } else if similarity >= self.medium {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    /// MEDIUM 及以上视为合格匹配
    pub fn is_qualifying(&self, similarity: f32) -> bool {
        similarity >= self.medium
    }
}

/// 单次匹配结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub task_id: String,
    pub step_id: String,
    pub similarity: f32,
    pub confidence_band: ConfidenceBand,
    pub matched_cues: Vec<String>,
}

/// 观察文本匹配器（状态追踪器依赖此 trait，便于替换）
pub trait ObservationMatcher: Send + Sync {
    /// `current_task` 为当前信念所在任务，可用于缩小搜索范围
    fn match_observation(&self, observation: &str, current_task: Option<&str>)
        -> Option<MatchResult>;
}

struct IndexedStep {
    step_id: String,
    cues: Vec<(String, HashSet<String>)>,
    text: HashSet<String>,
    tools: HashSet<String>,
}

impl IndexedStep {
    fn new(step: &StepDefinition) -> Self {
        let cues = step
            .visual_cues
            .iter()
            .map(|c| (c.clone(), tokenize_to_set(c)))
            .filter(|(_, tokens)| !tokens.is_empty())
            .collect();
        let text = tokenize_to_set(&format!("{} {}", step.title, step.description));
        let tools = step
            .tools_needed
            .iter()
            .flat_map(|t| tokenize_to_set(t))
            .collect();
        Self {
            step_id: step.step_id.clone(),
            cues,
            text,
            tools,
        }
    }

    /// 返回 (相似度, 命中的视觉线索)
    fn score(&self, observation: &HashSet<String>) -> (f32, Vec<String>) {
        let text = dice_similarity(observation, &self.text);

        let mut best_cue = 0.0f32;
        let mut matched = Vec::new();
        for (raw, tokens) in &self.cues {
            let c = containment(tokens, observation);
            if c > 0.0 {
                matched.push(raw.clone());
            }
            best_cue = best_cue.max(c);
        }

        // 没有视觉线索 / 工具的步骤用文本分数补位，避免分数上限被压低
        let cue = if self.cues.is_empty() { text } else { best_cue };
        let tools = if self.tools.is_empty() {
            text
        } else {
            containment(&self.tools, observation)
        };

        let similarity = (CUE_WEIGHT * cue + TEXT_WEIGHT * text + TOOLS_WEIGHT * tools).clamp(0.0, 1.0);
        (similarity, matched)
    }
}

struct IndexedTask {
    task_id: String,
    steps: Vec<IndexedStep>,
}

/// 基于词重叠的步骤匹配器
pub struct StepMatcher {
    index: Vec<IndexedTask>,
    bands: ConfidenceBands,
    narrow_to_current_task: bool,
}

impl StepMatcher {
    pub fn new(store: &dyn KnowledgeStore, bands: ConfidenceBands) -> Self {
        let index: Vec<IndexedTask> = store
            .list_tasks()
            .into_iter()
            .filter_map(|id| store.get_task(&id))
            .map(|task| IndexedTask {
                task_id: task.task_id.clone(),
                steps: task.steps.iter().map(IndexedStep::new).collect(),
            })
            .collect();

        tracing::debug!(
            tasks = index.len(),
            steps = index.iter().map(|t| t.steps.len()).sum::<usize>(),
            "Step matcher index built"
        );

        Self {
            index,
            bands,
            narrow_to_current_task: true,
        }
    }

    pub fn with_narrowing(mut self, enabled: bool) -> Self {
        self.narrow_to_current_task = enabled;
        self
    }

    fn best_in<'a>(
        &self,
        tasks: impl Iterator<Item = &'a IndexedTask>,
        observation: &HashSet<String>,
    ) -> Option<MatchResult> {
        let mut best: Option<MatchResult> = None;
        for task in tasks {
            for step in &task.steps {
                let (similarity, matched_cues) = step.score(observation);
                // 严格大于：同分时保留任务顺序中靠前的步骤
                if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                    best = Some(MatchResult {
                        task_id: task.task_id.clone(),
                        step_id: step.step_id.clone(),
                        similarity,
                        confidence_band: self.bands.band_for(similarity),
                        matched_cues,
                    });
                }
            }
        }
        best
    }
}

impl ObservationMatcher for StepMatcher {
    fn match_observation(
        &self,
        observation: &str,
        current_task: Option<&str>,
    ) -> Option<MatchResult> {
        if self.index.is_empty() {
            return None;
        }
        let tokens = tokenize_to_set(observation);

        let narrowed = match current_task {
            Some(task_id) if self.narrow_to_current_task => {
                self.best_in(self.index.iter().filter(|t| t.task_id == task_id), &tokens)
            }
            _ => None,
        };

        match narrowed {
            Some(result) if self.bands.is_qualifying(result.similarity) => Some(result),
            narrowed => {
                let global = self.best_in(self.index.iter(), &tokens);
                match (narrowed, global) {
                    (Some(n), Some(g)) if n.similarity >= g.similarity => Some(n),
                    (_, g) => g,
                }
            }
        }
    }
}
