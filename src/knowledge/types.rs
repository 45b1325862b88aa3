//! 任务知识：任务与步骤定义（启动时加载，之后只读）

use serde::{Deserialize, Serialize};

/// 单个步骤定义（step_id 在任务内唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    #[serde(rename = "id")]
    pub step_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools_needed: Vec<String>,
    /// 视觉线索：观察文本中出现这些描述时，说明用户大概率处于该步骤
    #[serde(default)]
    pub visual_cues: Vec<String>,
    /// 预计耗时（秒）
    #[serde(default)]
    pub estimated_duration: Option<u64>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
}

impl StepDefinition {
    pub fn new(step_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            title: title.into(),
            description: String::new(),
            tools_needed: Vec::new(),
            visual_cues: Vec::new(),
            estimated_duration: None,
            safety_notes: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools_needed = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cues<I, S>(mut self, cues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visual_cues = cues.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.estimated_duration = Some(secs);
        self
    }

    pub fn with_safety_note(mut self, note: impl Into<String>) -> Self {
        self.safety_notes.push(note.into());
        self
    }
}

/// 任务定义：有序步骤 + 全局安全提示 + 完成标志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    #[serde(rename = "id")]
    pub task_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
    #[serde(default)]
    pub completion_indicators: Vec<String>,
}

impl TaskDefinition {
    pub fn new(task_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            display_name: display_name.into(),
            steps: Vec::new(),
            safety_notes: Vec::new(),
            completion_indicators: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_completion_indicator(mut self, indicator: impl Into<String>) -> Self {
        self.completion_indicators.push(indicator.into());
        self
    }

    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// 步骤在任务中的位置（从 0 开始）
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_id == step_id)
    }

    /// 给定步骤之后的下一个步骤；已是最后一步时返回 None
    pub fn next_step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.step_index(step_id).and_then(|i| self.steps.get(i + 1))
    }
}
