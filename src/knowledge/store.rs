//! 任务知识库
//!
//! 从 config/tasks/ 目录加载 *.toml 任务定义；加载失败或定义不合法属于启动期致命错误。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::core::StepwiseError;
use crate::knowledge::{StepDefinition, TaskDefinition};

/// 只读任务知识库
pub trait KnowledgeStore: Send + Sync {
    fn get_task(&self, task_id: &str) -> Option<Arc<TaskDefinition>>;

    /// 按加载顺序返回所有任务 ID
    fn list_tasks(&self) -> Vec<String>;
}

/// 单个任务文件（task.toml）
#[derive(Debug, Deserialize)]
struct TaskToml {
    task: TaskMeta,
    #[serde(default)]
    steps: Vec<StepDefinition>,
}

#[derive(Debug, Deserialize)]
struct TaskMeta {
    id: String,
    name: String,
    #[serde(default)]
    safety_notes: Vec<String>,
    #[serde(default)]
    completion_indicators: Vec<String>,
}

impl From<TaskToml> for TaskDefinition {
    fn from(raw: TaskToml) -> Self {
        TaskDefinition {
            task_id: raw.task.id,
            display_name: raw.task.name,
            steps: raw.steps,
            safety_notes: raw.task.safety_notes,
            completion_indicators: raw.task.completion_indicators,
        }
    }
}

/// 内存知识库，保留任务加载顺序
#[derive(Debug, Default, Clone)]
pub struct InMemoryKnowledgeStore {
    tasks: Vec<Arc<TaskDefinition>>,
}

impl InMemoryKnowledgeStore {
    /// 从任务列表构建，同时做合法性校验
    pub fn from_tasks(tasks: Vec<TaskDefinition>) -> Result<Self, StepwiseError> {
        let mut seen = HashSet::new();
        for task in &tasks {
            validate_task(task)?;
            if !seen.insert(task.task_id.clone()) {
                return Err(StepwiseError::InvalidKnowledge(format!(
                    "duplicate task id '{}'",
                    task.task_id
                )));
            }
        }
        Ok(Self {
            tasks: tasks.into_iter().map(Arc::new).collect(),
        })
    }

    /// 解析单个 TOML 文本
    pub fn parse_task(content: &str) -> Result<TaskDefinition, StepwiseError> {
        let raw: TaskToml = toml::from_str(content)
            .map_err(|e| StepwiseError::KnowledgeLoad(e.to_string()))?;
        Ok(raw.into())
    }

    /// 加载目录下所有 *.toml（按文件名排序，保证任务顺序稳定）
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, StepwiseError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            StepwiseError::KnowledgeLoad(format!("{}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "toml").unwrap_or(false))
            .collect();
        paths.sort();

        let mut tasks = Vec::with_capacity(paths.len());
        for path in &paths {
            let content = std::fs::read_to_string(path).map_err(|e| {
                StepwiseError::KnowledgeLoad(format!("{}: {}", path.display(), e))
            })?;
            let task = Self::parse_task(&content).map_err(|e| {
                StepwiseError::KnowledgeLoad(format!("{}: {}", path.display(), e))
            })?;
            tracing::debug!(task = %task.task_id, steps = task.steps.len(), "Parsed task file");
            tasks.push(task);
        }

        if tasks.is_empty() {
            return Err(StepwiseError::KnowledgeLoad(format!(
                "no task definitions found in {}",
                dir.display()
            )));
        }

        let store = Self::from_tasks(tasks)?;
        tracing::info!("Loaded {} tasks from {}", store.tasks.len(), dir.display());
        Ok(store)
    }
}

impl KnowledgeStore for InMemoryKnowledgeStore {
    fn get_task(&self, task_id: &str) -> Option<Arc<TaskDefinition>> {
        self.tasks.iter().find(|t| t.task_id == task_id).cloned()
    }

    fn list_tasks(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.task_id.clone()).collect()
    }
}

fn validate_task(task: &TaskDefinition) -> Result<(), StepwiseError> {
    if task.task_id.trim().is_empty() {
        return Err(StepwiseError::InvalidKnowledge("task with empty id".to_string()));
    }
    if task.steps.is_empty() {
        return Err(StepwiseError::InvalidKnowledge(format!(
            "task '{}' has no steps",
            task.task_id
        )));
    }
    let mut ids = HashSet::new();
    for step in &task.steps {
        if !ids.insert(step.step_id.as_str()) {
            return Err(StepwiseError::InvalidKnowledge(format!(
                "task '{}' has duplicate step id '{}'",
                task.task_id, step.step_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COFFEE: &str = r#"
[task]
id = "coffee"
name = "Pour-over coffee"
safety_notes = ["Kettle water is near boiling"]
completion_indicators = ["coffee in the mug"]

[[steps]]
id = "boil"
title = "Boil water"
description = "Heat water in the kettle"
tools_needed = ["kettle"]
visual_cues = ["kettle on the stove"]
estimated_duration = 180

[[steps]]
id = "grind"
title = "Grind beans"
tools_needed = ["grinder"]
"#;

    #[test]
    fn test_parse_task() {
        let task = InMemoryKnowledgeStore::parse_task(COFFEE).unwrap();
        assert_eq!(task.task_id, "coffee");
        assert_eq!(task.display_name, "Pour-over coffee");
        assert_eq!(task.steps.len(), 2);
        assert_eq!(task.steps[0].estimated_duration, Some(180));
        assert!(task.steps[1].visual_cues.is_empty());
        assert_eq!(task.completion_indicators, vec!["coffee in the mug".to_string()]);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("coffee.toml"), COFFEE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = InMemoryKnowledgeStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.list_tasks(), vec!["coffee".to_string()]);
        assert!(store.get_task("coffee").is_some());
        assert!(store.get_task("tea").is_none());
    }

    #[test]
    fn test_load_dir_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = InMemoryKnowledgeStore::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, StepwiseError::KnowledgeLoad(_)));
    }

    #[test]
    fn test_load_dir_missing_is_error() {
        let err = InMemoryKnowledgeStore::load_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, StepwiseError::KnowledgeLoad(_)));
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let task = TaskDefinition::new("t", "T")
            .with_step(StepDefinition::new("a", "A"))
            .with_step(StepDefinition::new("a", "A again"));
        let err = InMemoryKnowledgeStore::from_tasks(vec![task]).unwrap_err();
        assert!(matches!(err, StepwiseError::InvalidKnowledge(_)));
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let task = TaskDefinition::new("t", "T").with_step(StepDefinition::new("a", "A"));
        let err = InMemoryKnowledgeStore::from_tasks(vec![task.clone(), task]).unwrap_err();
        assert!(matches!(err, StepwiseError::InvalidKnowledge(_)));
    }

    #[test]
    fn test_task_without_steps_rejected() {
        let err =
            InMemoryKnowledgeStore::from_tasks(vec![TaskDefinition::new("t", "T")]).unwrap_err();
        assert!(matches!(err, StepwiseError::InvalidKnowledge(_)));
    }
}
