//! Mock 视觉客户端（用于测试与未配置视觉服务时的本地运行）
//!
//! 人设保存在内存中；可脚本化回复、失败、挂起以及 set_persona 失败，并记录调用情况。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::VisionError;
use crate::vision::{CachedFrame, Message, PersonaToken, Role, VisionClient};

/// chat 的行为
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// 回显最后一条用户消息
    Echo,
    Reply(String),
    Fail(VisionError),
    /// 睡眠指定时长后再回显（用于超时测试）
    Hang(Duration),
}

/// 一次 chat 调用的记录
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub persona: PersonaToken,
    pub messages: Vec<Message>,
    pub had_image: bool,
    pub max_tokens: u32,
}

#[derive(Debug)]
pub struct MockVisionClient {
    persona: Mutex<PersonaToken>,
    behavior: Mutex<MockBehavior>,
    /// 每次 set_persona 依次弹出：true 表示本次失败；脚本为空时成功
    set_persona_failures: Mutex<VecDeque<bool>>,
    /// 每次 set_persona 依次弹出的延迟；脚本为空时立即完成
    set_persona_delays: Mutex<VecDeque<Duration>>,
    fail_get_persona: Mutex<bool>,
    chats: Mutex<Vec<ChatRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockVisionClient {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: Mutex::new(PersonaToken::new(persona)),
            behavior: Mutex::new(MockBehavior::Echo),
            set_persona_failures: Mutex::new(VecDeque::new()),
            set_persona_delays: Mutex::new(VecDeque::new()),
            fail_get_persona: Mutex::new(false),
            chats: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_behavior(self, behavior: MockBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn with_set_persona_script(self, script: impl IntoIterator<Item = bool>) -> Self {
        *self.set_persona_failures.lock().unwrap_or_else(|e| e.into_inner()) =
            script.into_iter().collect();
        self
    }

    pub fn with_set_persona_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        *self.set_persona_delays.lock().unwrap_or_else(|e| e.into_inner()) =
            delays.into_iter().collect();
        self
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    pub fn set_get_persona_failing(&self, failing: bool) {
        *self.fail_get_persona.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    /// 当前人设（不经过 trait，测试直接读取）
    pub fn persona(&self) -> PersonaToken {
        self.persona.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn chats(&self) -> Vec<ChatRecord> {
        self.chats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 同一时刻进行中的 chat 调用数的最大值
    pub fn max_concurrent_chats(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockVisionClient {
    fn default() -> Self {
        Self::new("You are a concise step-by-step task coach.")
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VisionClient for MockVisionClient {
    async fn chat(
        &self,
        messages: &[Message],
        image: Option<&CachedFrame>,
        max_tokens: u32,
    ) -> Result<String, VisionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.chats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ChatRecord {
                persona: self.persona(),
                messages: messages.to_vec(),
                had_image: image.is_some(),
                max_tokens,
            });

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| "(no input)".to_string());

        let behavior = self.behavior.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match behavior {
            MockBehavior::Echo => {
                // 让出调度，使并发调用有机会交错
                tokio::task::yield_now().await;
                Ok(format!("Echo from Mock: {}", last_user))
            }
            MockBehavior::Reply(text) => Ok(text),
            MockBehavior::Fail(err) => Err(err),
            MockBehavior::Hang(d) => {
                tokio::time::sleep(d).await;
                Ok(format!("Echo from Mock: {}", last_user))
            }
        }
    }

    async fn get_persona(&self) -> Result<PersonaToken, VisionError> {
        if *self.fail_get_persona.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(VisionError::Unavailable("mock get_persona failure".to_string()));
        }
        Ok(self.persona())
    }

    async fn set_persona(&self, persona: &PersonaToken) -> Result<(), VisionError> {
        let delay = self
            .set_persona_delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let fail = self
            .set_persona_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(false);
        if fail {
            return Err(VisionError::Unavailable("mock set_persona failure".to_string()));
        }
        *self.persona.lock().unwrap_or_else(|e| e.into_inner()) = persona.clone();
        Ok(())
    }
}
