//! 回退编排：临时切换视觉模型人设来回答结构化路径答不了的问题
//!
//! 协议：
//! 1. 持锁后快照当前人设（上次恢复失败时，以记下的原人设为准并先尝试恢复）
//! 2. 切换为「开放对话」人设（信念只作为软上下文）
//! 3. 带超时调用 chat，可附带最近一帧图片
//! 4. 解析自由文本回复
//! 5. 无论成功、超时还是出错，都恢复原人设后再释放锁
//!
//! 人设是远端服务上的全局状态，所有回退调用经同一把异步锁串行执行。
//! `PersonaSwap` 持有锁守卫：正常路径显式 `restore().await`；若 future 被取消或 panic，
//! Drop 会派生任务完成恢复，锁在恢复结束前不会释放。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::Instrument;
use uuid::Uuid;

use crate::core::classifier::{detect_locale, Locale};
use crate::core::state::BeliefState;
use crate::core::{StepwiseError, VisionError};
use crate::knowledge::KnowledgeStore;
use crate::vision::{CachedFrame, Message, PersonaToken, VisionClient};

/// 回退调用参数（来自配置 [fallback]）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackSettings {
    pub timeout: Duration,
    pub restore_timeout: Duration,
    pub max_tokens: u32,
    /// 成功回退时给出的置信度（模型回复本身没有置信度）
    pub answer_confidence: f32,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            restore_timeout: Duration::from_secs(5),
            max_tokens: 256,
            answer_confidence: 0.5,
        }
    }
}

/// 回退结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackAnswer {
    pub text: String,
    pub confidence: f32,
    /// 视觉服务不可用/超时/空回复时为 true
    pub degraded: bool,
}

#[derive(Debug, Default)]
struct SwapState {
    /// 上次恢复失败时记下的原人设
    pending_restore: Option<PersonaToken>,
}

async fn restore_persona(
    client: &dyn VisionClient,
    persona: &PersonaToken,
    timeout: Duration,
) -> Result<(), VisionError> {
    match tokio::time::timeout(timeout, client.set_persona(persona)).await {
        Ok(result) => result,
        Err(_) => Err(VisionError::Timeout),
    }
}

/// 作用域内的人设切换；持有锁守卫直到原人设恢复
struct PersonaSwap {
    client: Arc<dyn VisionClient>,
    original: PersonaToken,
    guard: Option<OwnedMutexGuard<SwapState>>,
    restore_timeout: Duration,
}

impl PersonaSwap {
    async fn restore(mut self) -> Result<(), StepwiseError> {
        let Some(mut guard) = self.guard.take() else {
            return Ok(());
        };
        // 恢复完成前先记下原人设：若此处被取消，守卫随之释放，下一次调用仍会补恢复
        guard.pending_restore = Some(self.original.clone());
        match restore_persona(self.client.as_ref(), &self.original, self.restore_timeout).await {
            Ok(()) => {
                guard.pending_restore = None;
                Ok(())
            }
            Err(e) => Err(StepwiseError::PersonaRestore(e)),
        }
    }
}

impl Drop for PersonaSwap {
    fn drop(&mut self) {
        let Some(mut guard) = self.guard.take() else {
            return;
        };
        let original = self.original.clone();
        tracing::warn!(persona = %original, "Persona swap dropped before restore, restoring in background");
        guard.pending_restore = Some(original.clone());
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = Arc::clone(&self.client);
            let timeout = self.restore_timeout;
            handle.spawn(async move {
                match restore_persona(client.as_ref(), &original, timeout).await {
                    Ok(()) => guard.pending_restore = None,
                    Err(e) => tracing::warn!("Background persona restore failed: {}", e),
                }
            });
        }
    }
}

pub struct FallbackOrchestrator {
    client: Arc<dyn VisionClient>,
    knowledge: Arc<dyn KnowledgeStore>,
    settings: FallbackSettings,
    state: Arc<Mutex<SwapState>>,
}

impl FallbackOrchestrator {
    pub fn new(
        client: Arc<dyn VisionClient>,
        knowledge: Arc<dyn KnowledgeStore>,
        settings: FallbackSettings,
    ) -> Self {
        Self {
            client,
            knowledge,
            settings,
            state: Arc::new(Mutex::new(SwapState::default())),
        }
    }

    /// 回答一次查询；永远返回一个回复，不向调用方抛错
    pub async fn answer(
        &self,
        query: &str,
        belief: Option<&BeliefState>,
        frame: Option<&CachedFrame>,
    ) -> FallbackAnswer {
        let span = tracing::info_span!("fallback", request_id = %Uuid::new_v4());
        self.answer_inner(query, belief, frame).instrument(span).await
    }

    async fn answer_inner(
        &self,
        query: &str,
        belief: Option<&BeliefState>,
        frame: Option<&CachedFrame>,
    ) -> FallbackAnswer {
        let locale = detect_locale(query);
        let guard = Arc::clone(&self.state).lock_owned().await;

        let swap = match self.begin_swap(guard, query, belief, frame.is_some()).await {
            Ok(swap) => swap,
            Err(e) => {
                tracing::warn!("Fallback aborted before persona swap: {}", e);
                return self.degraded(locale);
            }
        };

        tracing::info!(has_image = frame.is_some(), "Asking vision model");
        let messages = [Message::user(query)];
        let result = tokio::time::timeout(
            self.settings.timeout,
            self.client.chat(&messages, frame, self.settings.max_tokens),
        )
        .await;

        if let Err(e) = swap.restore().await {
            tracing::warn!("{}", e);
        }

        match result {
            Ok(Ok(raw)) => match parse_response(&raw) {
                Some(text) => FallbackAnswer {
                    text,
                    confidence: self.settings.answer_confidence,
                    degraded: false,
                },
                None => {
                    tracing::warn!("Vision model returned an empty response");
                    self.degraded(locale)
                }
            },
            Ok(Err(e)) => {
                tracing::warn!("Vision chat failed: {}", e);
                self.degraded(locale)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.settings.timeout, "Vision chat timed out");
                self.degraded(locale)
            }
        }
    }

    /// 快照原人设并切换；切换本身失败时已尝试恢复
    async fn begin_swap(
        &self,
        mut guard: OwnedMutexGuard<SwapState>,
        query: &str,
        belief: Option<&BeliefState>,
        has_image: bool,
    ) -> Result<PersonaSwap, StepwiseError> {
        let original = match guard.pending_restore.clone() {
            Some(pending) => {
                // 上次恢复失败，远端仍停留在开放对话人设；先补一次恢复
                match restore_persona(self.client.as_ref(), &pending, self.settings.restore_timeout).await {
                    Ok(()) => {
                        tracing::info!("Recovered persona left over from a previous fallback");
                        guard.pending_restore = None;
                    }
                    Err(e) => tracing::warn!("Persona still not restored: {}", e),
                }
                pending
            }
            None => match tokio::time::timeout(
                self.settings.restore_timeout,
                self.client.get_persona(),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => return Err(VisionError::Timeout.into()),
            },
        };

        let swap = PersonaSwap {
            client: Arc::clone(&self.client),
            original,
            guard: Some(guard),
            restore_timeout: self.settings.restore_timeout,
        };

        let dialogue = self.open_dialogue_persona(query, belief, has_image);
        let err = match tokio::time::timeout(
            self.settings.restore_timeout,
            self.client.set_persona(&dialogue),
        )
        .await
        {
            Ok(Ok(())) => return Ok(swap),
            Ok(Err(e)) => e,
            Err(_) => VisionError::Timeout,
        };
        if let Err(e) = swap.restore().await {
            tracing::warn!("{}", e);
        }
        Err(err.into())
    }

    fn open_dialogue_persona(
        &self,
        query: &str,
        belief: Option<&BeliefState>,
        has_image: bool,
    ) -> PersonaToken {
        let mut prompt = String::from(
            "You are a friendly assistant helping someone with a hands-on task. \
             Answer the user's question directly in at most three sentences, \
             in the same language as the question.",
        );
        prompt.push_str(&format!("\nThe user asked: \"{}\"", query.trim()));

        match belief {
            Some(b) => {
                let task = self.knowledge.get_task(&b.task_id);
                let task_name = task
                    .as_ref()
                    .map(|t| t.display_name.clone())
                    .unwrap_or_else(|| b.task_id.clone());
                let step_title = task
                    .as_ref()
                    .and_then(|t| t.step(&b.step_id).map(|s| s.title.clone()))
                    .unwrap_or_else(|| b.step_id.clone());
                prompt.push_str(&format!(
                    "\nBackground that may be outdated (do not state it as fact): \
                     the user was last seen doing '{}', around the step '{}' \
                     (match confidence {:.2}).",
                    task_name, step_title, b.confidence
                ));
            }
            None => prompt.push_str(
                "\nYou have no reliable information about what the user is currently doing.",
            ),
        }

        if has_image {
            prompt.push_str(
                "\nAn image of the user's current view is attached; trust what you see over the background.",
            );
        } else {
            prompt.push_str(
                "\nNo image is available; if the question needs one, say you cannot see the scene.",
            );
        }
        PersonaToken::new(prompt)
    }

    fn degraded(&self, locale: Locale) -> FallbackAnswer {
        FallbackAnswer {
            text: degraded_message(locale).to_string(),
            confidence: 0.0,
            degraded: true,
        }
    }
}

pub fn degraded_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Sorry, I can't take a closer look right now. Please ask again in a moment.",
        Locale::Zh => "抱歉，我现在没办法查看画面，请稍后再问一次。",
    }
}

fn role_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?i:assistant|助手)\s*[:：]\s*").expect("valid regex"))
}

fn inline_space() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").expect("valid regex"))
}

fn blank_lines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n+").expect("valid regex"))
}

/// 清理模型回复：去掉角色前缀、合并空白；空回复返回 None
fn parse_response(raw: &str) -> Option<String> {
    let text = role_prefix().replace(raw.trim(), "");
    let text = inline_space().replace_all(&text, " ");
    let text = blank_lines().replace_all(&text, "\n\n");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
