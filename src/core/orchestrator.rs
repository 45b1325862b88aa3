//! 查询编排：回答一次查询
//!
//! 读取当前信念 → 回退决策 → 直接用模板回答（source = STATE）或交给回退编排（source = FALLBACK）。
//! 模板回复是确定性的：只由信念与步骤定义决定，按查询语言输出中文或英文。

use std::sync::Arc;

use serde::Serialize;

use crate::core::classifier::{detect_locale, Locale, QueryClassifier, QueryType};
use crate::core::decision::FallbackPolicy;
use crate::core::fallback::FallbackOrchestrator;
use crate::core::state::{BeliefState, StateTracker};
use crate::knowledge::{KnowledgeStore, StepDefinition, TaskDefinition};
use crate::vision::ImageCache;

/// 回复来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnswerSource {
    State,
    Fallback,
}

/// 一次查询的回复
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub confidence: f32,
    pub source: AnswerSource,
    pub query_type: QueryType,
}

pub struct QueryOrchestrator {
    tracker: Arc<StateTracker>,
    knowledge: Arc<dyn KnowledgeStore>,
    images: Arc<ImageCache>,
    fallback: Arc<FallbackOrchestrator>,
    classifier: QueryClassifier,
    policy: FallbackPolicy,
}

impl QueryOrchestrator {
    pub fn new(
        tracker: Arc<StateTracker>,
        knowledge: Arc<dyn KnowledgeStore>,
        images: Arc<ImageCache>,
        fallback: Arc<FallbackOrchestrator>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            tracker,
            knowledge,
            images,
            fallback,
            classifier: QueryClassifier::new(),
            policy,
        }
    }

    pub async fn answer(&self, query: &str) -> Answer {
        let belief = self.tracker.current_belief();
        let query_type = self.classifier.classify(query);

        let belief = match (self.policy.decide(query, belief.as_ref()), belief) {
            (None, Some(belief)) => belief,
            (reason, belief) => {
                tracing::info!(?reason, ?query_type, "Routing query to vision fallback");
                return self.ask_fallback(query, belief.as_ref(), query_type).await;
            }
        };

        match self.compose(&belief, query_type, detect_locale(query)) {
            Some(text) => {
                tracing::debug!(?query_type, step = %belief.step_id, "Answered from belief");
                Answer {
                    text,
                    confidence: belief.confidence,
                    source: AnswerSource::State,
                    query_type,
                }
            }
            None => {
                tracing::warn!(
                    task = %belief.task_id,
                    step = %belief.step_id,
                    "Believed step not found in knowledge store"
                );
                self.ask_fallback(query, Some(&belief), query_type).await
            }
        }
    }

    async fn ask_fallback(
        &self,
        query: &str,
        belief: Option<&BeliefState>,
        query_type: QueryType,
    ) -> Answer {
        let frame = self.images.get();
        if let Some(f) = &frame {
            tracing::debug!(age_ms = f.age().num_milliseconds(), "Attaching cached frame");
        }
        let result = self.fallback.answer(query, belief, frame.as_ref()).await;
        Answer {
            text: result.text,
            confidence: result.confidence,
            source: AnswerSource::Fallback,
            query_type,
        }
    }

    fn compose(&self, belief: &BeliefState, query_type: QueryType, locale: Locale) -> Option<String> {
        let task = self.knowledge.get_task(&belief.task_id)?;
        let index = task.step_index(&belief.step_id)?;
        let step = &task.steps[index];

        match query_type {
            QueryType::Progress => Some(progress_text(&task, step, index, locale)),
            QueryType::NextStep => Some(next_step_text(&task, step, index, locale)),
            QueryType::Tools => Some(tools_text(step, locale)),
            QueryType::Capabilities => Some(capabilities_text(&task, locale)),
            QueryType::Unknown => None,
        }
    }
}

fn format_duration(secs: u64, locale: Locale) -> String {
    match (locale, secs >= 60) {
        (Locale::En, true) => format!("about {} min", (secs + 30) / 60),
        (Locale::En, false) => format!("about {} s", secs),
        (Locale::Zh, true) => format!("约 {} 分钟", (secs + 30) / 60),
        (Locale::Zh, false) => format!("约 {} 秒", secs),
    }
}

fn progress_text(task: &TaskDefinition, step: &StepDefinition, index: usize, locale: Locale) -> String {
    let total = task.steps.len();
    match locale {
        Locale::En => {
            let mut text = format!(
                "You're on step {} of {} of {}: {}.",
                index + 1,
                total,
                task.display_name,
                step.title
            );
            if let Some(secs) = step.estimated_duration {
                text.push_str(&format!(" It usually takes {}.", format_duration(secs, locale)));
            }
            text
        }
        Locale::Zh => {
            let mut text = format!(
                "你正在进行「{}」的第 {}/{} 步：{}。",
                task.display_name,
                index + 1,
                total,
                step.title
            );
            if let Some(secs) = step.estimated_duration {
                text.push_str(&format!("通常需要{}。", format_duration(secs, locale)));
            }
            text
        }
    }
}

fn next_step_text(task: &TaskDefinition, step: &StepDefinition, index: usize, locale: Locale) -> String {
    let total = task.steps.len();
    let Some(next) = task.next_step(&step.step_id) else {
        return match locale {
            Locale::En => {
                let mut text = format!("This is the last step of {}.", task.display_name);
                if !task.completion_indicators.is_empty() {
                    text.push_str(&format!(
                        " You're done when you see: {}.",
                        task.completion_indicators.join(", ")
                    ));
                }
                text
            }
            Locale::Zh => {
                let mut text = format!("这已经是「{}」的最后一步。", task.display_name);
                if !task.completion_indicators.is_empty() {
                    text.push_str(&format!(
                        "看到以下情况就完成了：{}。",
                        task.completion_indicators.join("、")
                    ));
                }
                text
            }
        };
    };

    match locale {
        Locale::En => {
            let mut parts = vec![format!("Next is step {} of {}: {}.", index + 2, total, next.title)];
            if !next.description.is_empty() {
                parts.push(next.description.clone());
            }
            if !next.safety_notes.is_empty() {
                parts.push(format!("Safety: {}.", next.safety_notes.join("; ")));
            }
            parts.join(" ")
        }
        Locale::Zh => {
            let mut text = format!("下一步是第 {}/{} 步：{}。", index + 2, total, next.title);
            if !next.description.is_empty() {
                text.push_str(&next.description);
            }
            if !next.safety_notes.is_empty() {
                text.push_str(&format!("注意：{}。", next.safety_notes.join("；")));
            }
            text
        }
    }
}

fn tools_text(step: &StepDefinition, locale: Locale) -> String {
    match (locale, step.tools_needed.is_empty()) {
        (Locale::En, false) => format!("For {} you need: {}.", step.title, step.tools_needed.join(", ")),
        (Locale::En, true) => format!("You don't need any tools for {}.", step.title),
        (Locale::Zh, false) => format!("「{}」需要：{}。", step.title, step.tools_needed.join("、")),
        (Locale::Zh, true) => format!("「{}」不需要任何工具。", step.title),
    }
}

fn capabilities_text(task: &TaskDefinition, locale: Locale) -> String {
    match locale {
        Locale::En => format!(
            "I follow along while you work on {} and can tell you which step you're on, \
             what comes next and which tools you need. For anything else I'll take a look \
             through the camera.",
            task.display_name
        ),
        Locale::Zh => format!(
            "我会跟着你完成「{}」，可以告诉你现在在哪一步、下一步做什么、需要哪些工具；\
             其他问题我会通过摄像头看一看。",
            task.display_name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TaskDefinition {
        TaskDefinition::new("coffee", "pour-over coffee")
            .with_step(
                StepDefinition::new("boil", "Boil water")
                    .with_tools(["kettle"])
                    .with_duration(180),
            )
            .with_step(
                StepDefinition::new("pour", "Pour water")
                    .with_description("Pour slowly in circles.")
                    .with_safety_note("the water is hot"),
            )
            .with_completion_indicator("coffee in the mug")
    }

    #[test]
    fn test_progress_text() {
        let t = task();
        assert_eq!(
            progress_text(&t, &t.steps[0], 0, Locale::En),
            "You're on step 1 of 2 of pour-over coffee: Boil water. It usually takes about 3 min."
        );
        assert!(progress_text(&t, &t.steps[0], 0, Locale::Zh).contains("第 1/2 步"));
    }

    #[test]
    fn test_next_step_text() {
        let t = task();
        assert_eq!(
            next_step_text(&t, &t.steps[0], 0, Locale::En),
            "Next is step 2 of 2: Pour water. Pour slowly in circles. Safety: the water is hot."
        );
        assert_eq!(
            next_step_text(&t, &t.steps[1], 1, Locale::En),
            "This is the last step of pour-over coffee. You're done when you see: coffee in the mug."
        );
    }

    #[test]
    fn test_tools_text() {
        let t = task();
        assert_eq!(tools_text(&t.steps[0], Locale::En), "For Boil water you need: kettle.");
        assert_eq!(
            tools_text(&t.steps[1], Locale::En),
            "You don't need any tools for Pour water."
        );
        assert_eq!(tools_text(&t.steps[0], Locale::Zh), "「Boil water」需要：kettle。");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45, Locale::En), "about 45 s");
        assert_eq!(format_duration(150, Locale::En), "about 3 min");
        assert_eq!(format_duration(60, Locale::Zh), "约 1 分钟");
    }
}
