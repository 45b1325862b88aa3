//! 对外接口：query / observe / get_belief
//!
//! Agent 把状态追踪、图片缓存与查询编排组装在一起，供驱动程序（stdin、HTTP 等前端）调用。
//! 所有返回类型以 camelCase 序列化为 JSON。

use std::sync::Arc;

use serde::Serialize;

use crate::config::AppConfig;
use crate::core::{
    AnswerSource, BeliefState, FallbackOrchestrator, FallbackPolicy, QueryOrchestrator,
    QueryType, StateTracker, StepwiseError,
};
use crate::knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use crate::matcher::{ObservationMatcher, StepMatcher};
use crate::vision::{CachedFrame, HttpVisionClient, ImageCache, MockVisionClient, VisionClient};

/// query 的返回
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub response: String,
    pub confidence: f32,
    pub source: AnswerSource,
    pub query_type: QueryType,
}

/// observe 的返回
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserveResponse {
    pub updated: bool,
}

/// get_belief 的返回；无信念时序列化为 `{}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeliefView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl BeliefView {
    pub fn is_empty(&self) -> bool {
        self.task_id.is_none()
    }
}

impl From<Option<BeliefState>> for BeliefView {
    fn from(belief: Option<BeliefState>) -> Self {
        match belief {
            Some(b) => Self {
                task_id: Some(b.task_id),
                step_id: Some(b.step_id),
                confidence: Some(b.confidence),
            },
            None => Self::default(),
        }
    }
}

pub struct Agent {
    tracker: Arc<StateTracker>,
    images: Arc<ImageCache>,
    orchestrator: QueryOrchestrator,
}

impl Agent {
    /// 使用基于词重叠的 StepMatcher 组装 Agent
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        vision: Arc<dyn VisionClient>,
        cfg: &AppConfig,
    ) -> Self {
        let matcher = StepMatcher::new(knowledge.as_ref(), cfg.bands())
            .with_narrowing(cfg.matcher.narrow_to_current_task);
        Self::with_matcher(Arc::new(matcher), knowledge, vision, cfg)
    }

    /// 使用自定义匹配器组装 Agent
    pub fn with_matcher(
        matcher: Arc<dyn ObservationMatcher>,
        knowledge: Arc<dyn KnowledgeStore>,
        vision: Arc<dyn VisionClient>,
        cfg: &AppConfig,
    ) -> Self {
        let tracker = Arc::new(StateTracker::new(matcher, cfg.tracker_config()));
        let images = Arc::new(ImageCache::new());
        let fallback = Arc::new(FallbackOrchestrator::new(
            vision,
            Arc::clone(&knowledge),
            cfg.fallback_settings(),
        ));
        let orchestrator = QueryOrchestrator::new(
            Arc::clone(&tracker),
            knowledge,
            Arc::clone(&images),
            fallback,
            FallbackPolicy::new(cfg.fallback.confidence_threshold),
        );
        Self {
            tracker,
            images,
            orchestrator,
        }
    }

    pub async fn query(&self, text: &str) -> QueryResponse {
        let answer = self.orchestrator.answer(text).await;
        QueryResponse {
            response: answer.text,
            confidence: answer.confidence,
            source: answer.source,
            query_type: answer.query_type,
        }
    }

    pub fn observe(&self, text: &str) -> ObserveResponse {
        ObserveResponse {
            updated: self.tracker.process_observation(text),
        }
    }

    pub fn get_belief(&self) -> BeliefView {
        self.tracker.current_belief().into()
    }

    /// 感知循环推送最近一帧
    pub fn put_frame(&self, frame: CachedFrame) {
        self.images.put(frame);
    }

    /// 用户换了任务或重新开始：清空信念与缓存的图片
    pub fn reset(&self) {
        self.tracker.reset();
        self.images.clear();
    }

    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    pub fn images(&self) -> &Arc<ImageCache> {
        &self.images
    }
}

/// 根据配置创建视觉客户端：设置了 vision.base_url 用 HTTP，否则用 Mock
pub fn create_vision_client(cfg: &AppConfig) -> Result<Arc<dyn VisionClient>, StepwiseError> {
    match cfg.vision.base_url.as_deref() {
        Some(base_url) if !base_url.trim().is_empty() => {
            tracing::info!(base_url, model = %cfg.vision.model, "Using HTTP vision client");
            let client = HttpVisionClient::new(
                base_url,
                &cfg.vision.model,
                std::time::Duration::from_secs(cfg.vision.request_timeout_secs),
            )
            .map_err(|e| StepwiseError::Config(format!("failed to build vision client: {}", e)))?
            .with_api_key(cfg.vision.api_key.clone());
            let client: Arc<dyn VisionClient> = Arc::new(client);
            Ok(client)
        }
        _ => {
            tracing::warn!("vision.base_url not set, falling back to mock vision client");
            let client: Arc<dyn VisionClient> = Arc::new(MockVisionClient::default());
            Ok(client)
        }
    }
}

/// 从配置创建 Agent：加载任务目录（失败即启动失败）并选择视觉客户端
pub fn create_agent_from_config(cfg: &AppConfig) -> Result<Agent, StepwiseError> {
    cfg.validate()?;
    let knowledge: Arc<dyn KnowledgeStore> =
        Arc::new(InMemoryKnowledgeStore::load_dir(&cfg.app.tasks_dir)?);
    Ok(Agent::new(knowledge, create_vision_client(cfg)?, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{StepDefinition, TaskDefinition};

    fn agent() -> Agent {
        let task = TaskDefinition::new("coffee", "pour-over coffee")
            .with_step(
                StepDefinition::new("grind", "Grind the beans")
                    .with_tools(["grinder"])
                    .with_cues(["grinder", "coffee beans", "grinding"]),
            )
            .with_step(
                StepDefinition::new("pour", "Pour hot water")
                    .with_tools(["kettle"])
                    .with_cues(["kettle", "pouring water", "filter"]),
            );
        let store = InMemoryKnowledgeStore::from_tasks(vec![task]).unwrap();
        Agent::new(
            Arc::new(store),
            Arc::new(MockVisionClient::default()),
            &AppConfig::default(),
        )
    }

    #[test]
    fn test_empty_belief_serializes_to_empty_object() {
        let agent = agent();
        let view = agent.get_belief();
        assert!(view.is_empty());
        assert_eq!(serde_json::to_string(&view).unwrap(), "{}");
    }

    #[test]
    fn test_reset_clears_belief_and_frame() {
        let agent = agent();
        agent.observe("user is grinding coffee beans with a grinder");
        agent.put_frame(CachedFrame::new(vec![1, 2], "image/png"));
        agent.reset();
        assert!(agent.get_belief().is_empty());
        assert!(agent.images().get().is_none());
    }

    #[test]
    fn test_observe_sets_belief() {
        let agent = agent();
        let res = agent.observe("user is grinding coffee beans with a grinder");
        assert!(res.updated);
        let view = agent.get_belief();
        assert_eq!(view.task_id.as_deref(), Some("coffee"));
        assert_eq!(view.step_id.as_deref(), Some("grind"));
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("taskId").is_some());
        assert!(json.get("stepId").is_some());
    }

    #[tokio::test]
    async fn test_query_from_state() {
        let agent = agent();
        agent.observe("user is grinding coffee beans with a grinder");
        let res = agent.query("what tools do I need?").await;
        assert_eq!(res.source, AnswerSource::State);
        assert_eq!(res.query_type, QueryType::Tools);
        assert!(res.response.contains("grinder"));

        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["source"], "STATE");
        assert_eq!(json["queryType"], "TOOLS");
    }

    #[tokio::test]
    async fn test_query_without_belief_uses_fallback() {
        let agent = agent();
        let res = agent.query("what step am I on?").await;
        assert_eq!(res.source, AnswerSource::Fallback);
        assert!(res.response.starts_with("Echo from Mock"));
    }

    #[test]
    fn test_create_vision_client_with_base_url() {
        let mut cfg = AppConfig::default();
        cfg.vision.base_url = Some("http://localhost:8080".to_string());
        assert!(create_vision_client(&cfg).is_ok());
    }

    #[test]
    fn test_create_agent_from_missing_dir_fails() {
        let mut cfg = AppConfig::default();
        cfg.app.tasks_dir = "/no/such/tasks".into();
        assert!(matches!(
            create_agent_from_config(&cfg),
            Err(StepwiseError::KnowledgeLoad(_))
        ));
    }
}
