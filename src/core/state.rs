//! 状态追踪：当前步骤信念 + 连续低分计数
//!
//! 信念与计数器是唯一的共享可变状态，放在同一把锁里，外部永远看不到二者不一致的中间态。
//! 采用「连续 N 次不合格即清空」而非时间衰减，对观察节奏的变化不敏感。

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::matcher::{MatchResult, ObservationMatcher};

/// 当前信念（整体替换，不做字段级修改）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeliefState {
    pub observed_at: DateTime<Utc>,
    pub raw_observation: String,
    pub task_id: String,
    pub step_id: String,
    pub confidence: f32,
}

impl BeliefState {
    fn from_match(observation: &str, result: &MatchResult) -> Self {
        Self {
            observed_at: Utc::now(),
            raw_observation: observation.to_string(),
            task_id: result.task_id.clone(),
            step_id: result.step_id.clone(),
            confidence: result.similarity,
        }
    }
}

/// 单次观察引起的状态转移（用于诊断）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// EMPTY → TRACKING
    Started,
    /// TRACKING → TRACKING（新的合格匹配，可能是同一步骤）
    Replaced,
    /// 不合格匹配，信念保持不变
    HeldLow { consecutive_low: u32 },
    /// 连续不合格达到上限，信念被清空（用户已离开任务）
    Evicted,
    /// EMPTY 状态下的不合格匹配
    Ignored,
}

impl Transition {
    /// 信念是否被合格匹配更新
    pub fn updated(&self) -> bool {
        matches!(self, Transition::Started | Transition::Replaced)
    }
}

/// 追踪器配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub max_consecutive_low: u32,
    /// 合格匹配阈值（MEDIUM 下限）
    pub qualifying_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_low: 5,
            qualifying_threshold: 0.40,
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    belief: Option<BeliefState>,
    consecutive_low: u32,
}

pub struct StateTracker {
    matcher: Arc<dyn ObservationMatcher>,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
}

impl StateTracker {
    pub fn new(matcher: Arc<dyn ObservationMatcher>, config: TrackerConfig) -> Self {
        Self {
            matcher,
            config: TrackerConfig {
                max_consecutive_low: config.max_consecutive_low.max(1),
                ..config
            },
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // 临界区内没有会 panic 的逻辑；即使锁被毒化，状态本身仍是一致的
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 处理一条观察；返回 true 表示信念被合格匹配更新
    pub fn process_observation(&self, observation: &str) -> bool {
        self.process_observation_detailed(observation).updated()
    }

    /// 处理一条观察并返回具体的状态转移
    pub fn process_observation_detailed(&self, observation: &str) -> Transition {
        let mut state = self.lock();

        let current_task = state.belief.as_ref().map(|b| b.task_id.clone());
        let result = self
            .matcher
            .match_observation(observation, current_task.as_deref());

        let qualifying = result
            .as_ref()
            .filter(|r| r.similarity >= self.config.qualifying_threshold);

        if let Some(result) = qualifying {
            let transition = if state.belief.is_some() {
                Transition::Replaced
            } else {
                Transition::Started
            };
            tracing::debug!(
                task = %result.task_id,
                step = %result.step_id,
                similarity = result.similarity,
                ?transition,
                "Qualifying observation"
            );
            state.belief = Some(BeliefState::from_match(observation, result));
            state.consecutive_low = 0;
            return transition;
        }

        if state.belief.is_none() {
            return Transition::Ignored;
        }

        state.consecutive_low += 1;
        if state.consecutive_low >= self.config.max_consecutive_low {
            let evicted = state.belief.take();
            state.consecutive_low = 0;
            if let Some(b) = evicted {
                tracing::info!(
                    task = %b.task_id,
                    step = %b.step_id,
                    after = self.config.max_consecutive_low,
                    "Belief evicted after consecutive low-confidence observations"
                );
            }
            return Transition::Evicted;
        }

        tracing::debug!(
            consecutive_low = state.consecutive_low,
            similarity = result.as_ref().map(|r| r.similarity),
            "Disqualifying observation, belief held"
        );
        Transition::HeldLow {
            consecutive_low: state.consecutive_low,
        }
    }

    pub fn current_belief(&self) -> Option<BeliefState> {
        self.lock().belief.clone()
    }

    pub fn consecutive_low(&self) -> u32 {
        self.lock().consecutive_low
    }

    /// 原子地读取 (信念, 计数器)
    pub fn snapshot(&self) -> (Option<BeliefState>, u32) {
        let state = self.lock();
        (state.belief.clone(), state.consecutive_low)
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.belief = None;
        state.consecutive_low = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{ConfidenceBands, MatchResult};

    /// 观察文本形如 "step3:0.85"，直接给出步骤与相似度；"none" 表示无知识
    struct ScriptedMatcher;

    impl ObservationMatcher for ScriptedMatcher {
        fn match_observation(&self, observation: &str, _: Option<&str>) -> Option<MatchResult> {
            let (step, score) = observation.split_once(':')?;
            let similarity: f32 = score.parse().ok()?;
            Some(MatchResult {
                task_id: "coffee".to_string(),
                step_id: step.to_string(),
                similarity,
                confidence_band: ConfidenceBands::default().band_for(similarity),
                matched_cues: vec![],
            })
        }
    }

    fn tracker() -> StateTracker {
        StateTracker::new(Arc::new(ScriptedMatcher), TrackerConfig::default())
    }

    #[test]
    fn test_empty_ignores_low() {
        let t = tracker();
        assert_eq!(t.process_observation_detailed("step1:0.2"), Transition::Ignored);
        assert_eq!(t.process_observation_detailed("none"), Transition::Ignored);
        assert!(t.current_belief().is_none());
        assert_eq!(t.consecutive_low(), 0);
    }

    #[test]
    fn test_eviction_after_exactly_n() {
        let t = tracker();
        assert!(t.process_observation("step3:0.85"));
        for i in 1..=4 {
            assert!(!t.process_observation("step9:0.25"));
            assert_eq!(t.consecutive_low(), i);
        }
        let belief = t.current_belief().unwrap();
        assert_eq!(belief.step_id, "step3");
        assert!((belief.confidence - 0.85).abs() < 1e-6);

        assert_eq!(t.process_observation_detailed("step9:0.25"), Transition::Evicted);
        assert!(t.current_belief().is_none());
        assert_eq!(t.consecutive_low(), 0);
    }

    #[test]
    fn test_none_counts_as_disqualifying() {
        let t = tracker();
        t.process_observation("step1:0.9");
        assert_eq!(
            t.process_observation_detailed("garbage"),
            Transition::HeldLow { consecutive_low: 1 }
        );
    }

    #[test]
    fn test_qualifying_resets_counter() {
        let t = tracker();
        t.process_observation("step3:0.85");
        t.process_observation("x:0.1");
        t.process_observation("x:0.1");
        assert_eq!(t.consecutive_low(), 2);
        assert_eq!(t.process_observation_detailed("step3:0.85"), Transition::Replaced);
        assert_eq!(t.consecutive_low(), 0);
        assert_eq!(t.current_belief().unwrap().step_id, "step3");
    }

    #[test]
    fn test_medium_fully_qualifies_and_non_monotonic() {
        let t = tracker();
        t.process_observation("step5:0.9");
        assert!(t.process_observation("step2:0.40"));
        let belief = t.current_belief().unwrap();
        assert_eq!(belief.step_id, "step2");
        assert!((belief.confidence - 0.40).abs() < 1e-6);
    }

    #[test]
    fn test_confidence_not_smoothed() {
        let t = tracker();
        t.process_observation("step1:0.95");
        t.process_observation("step1:0.55");
        assert!((t.current_belief().unwrap().confidence - 0.55).abs() < 1e-6);
        t.process_observation("step1:0.72");
        assert!((t.current_belief().unwrap().confidence - 0.72).abs() < 1e-6);
    }

    #[test]
    fn test_belief_presence_for_all_low_run_lengths() {
        let n = TrackerConfig::default().max_consecutive_low;
        for run in 0..=(n + 2) {
            let t = tracker();
            t.process_observation("step1:0.8");
            for _ in 0..run {
                t.process_observation("x:0.0");
            }
            // 第 n 次清空，之后的低分在 EMPTY 下被忽略
            assert_eq!(t.current_belief().is_some(), run < n, "run length {}", run);
        }
    }

    #[test]
    fn test_zero_max_is_clamped() {
        let t = StateTracker::new(
            Arc::new(ScriptedMatcher),
            TrackerConfig {
                max_consecutive_low: 0,
                qualifying_threshold: 0.4,
            },
        );
        t.process_observation("step1:0.8");
        assert_eq!(t.process_observation_detailed("x:0.1"), Transition::Evicted);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let t = tracker();
        t.process_observation("step1:0.8");
        t.process_observation("x:0.1");
        let (belief, low) = t.snapshot();
        assert!(belief.is_some());
        assert_eq!(low, 1);
        t.reset();
        assert_eq!(t.snapshot(), (None, 0));
    }
}
