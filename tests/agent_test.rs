//! 使用 config/tasks 中的示例任务与真实匹配器的集成测试

use std::sync::Arc;

use stepwise::config::AppConfig;
use stepwise::core::{AnswerSource, QueryType};
use stepwise::knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use stepwise::vision::{CachedFrame, MockVisionClient};
use stepwise::{create_agent_from_config, Agent};

fn agent(client: Arc<MockVisionClient>) -> Agent {
    let store = InMemoryKnowledgeStore::load_dir("config/tasks").unwrap();
    Agent::new(Arc::new(store), client, &AppConfig::default())
}

#[test]
fn test_sample_tasks_load() {
    let store = InMemoryKnowledgeStore::load_dir("config/tasks").unwrap();
    let tasks = store.list_tasks();
    assert!(tasks.contains(&"pour_over_coffee".to_string()));
    assert!(tasks.contains(&"green_tea".to_string()));
    let coffee = store.get_task("pour_over_coffee").unwrap();
    assert_eq!(coffee.steps.len(), 5);
}

#[test]
fn test_create_agent_from_default_config() {
    let agent = create_agent_from_config(&AppConfig::default()).unwrap();
    assert!(agent.get_belief().is_empty());
}

#[tokio::test]
async fn test_observe_then_ask_next_step() {
    let client = Arc::new(MockVisionClient::default());
    let agent = agent(client.clone());

    assert!(agent.observe("grinding coffee beans in the grinder on the scale").updated);
    let belief = agent.get_belief();
    assert_eq!(belief.task_id.as_deref(), Some("pour_over_coffee"));
    assert_eq!(belief.step_id.as_deref(), Some("grind_beans"));
    assert!(belief.confidence.unwrap() >= 0.70);

    let res = agent.query("What's next?").await;
    assert_eq!(res.query_type, QueryType::NextStep);
    assert_eq!(res.source, AnswerSource::State);
    assert!(res.response.starts_with("Next is step 3 of 5: Rinse the filter."));

    let res = agent.query("我现在在哪一步？").await;
    assert_eq!(res.source, AnswerSource::State);
    assert!(res.response.contains("第 2/5 步"));
    assert!(client.chats().is_empty());
}

#[tokio::test]
async fn test_switch_to_other_task() {
    let agent = agent(Arc::new(MockVisionClient::default()));
    agent.observe("grinding coffee beans in the grinder on the scale");
    assert!(agent.observe("往茶杯里放茶叶").updated);
    assert_eq!(agent.get_belief().task_id.as_deref(), Some("green_tea"));
}

#[tokio::test]
async fn test_open_question_uses_cached_frame() {
    let client = Arc::new(MockVisionClient::default());
    let agent = agent(client.clone());
    agent.observe("grinding coffee beans in the grinder on the scale");
    agent.put_frame(CachedFrame::new(vec![0xff, 0xd8, 0xff], "image/jpeg"));

    let res = agent.query("Is this grind size right for pour-over?").await;
    assert_eq!(res.source, AnswerSource::Fallback);
    assert_eq!(res.query_type, QueryType::Unknown);

    let chats = client.chats();
    assert_eq!(chats.len(), 1);
    assert!(chats[0].had_image);
    assert!(chats[0].persona.as_str().contains("Grind the beans"));
    assert_eq!(client.persona().as_str(), "You are a concise step-by-step task coach.");
}
