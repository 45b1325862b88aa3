//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEPWISE__*` 覆盖（双下划线表示嵌套，如 `STEPWISE__TRACKER__MAX_CONSECUTIVE_LOW=3`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{FallbackSettings, StepwiseError, TrackerConfig};
use crate::matcher::ConfidenceBands;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub matcher: MatcherSection,
    pub tracker: TrackerSection,
    pub fallback: FallbackSection,
    pub vision: VisionSection,
}

/// [app] 段：应用名、任务定义目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub tasks_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            tasks_dir: PathBuf::from("config/tasks"),
        }
    }
}

/// [matcher] 段：置信度分档阈值与任务内搜索
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherSection {
    pub high_threshold: f32,
    pub medium_threshold: f32,
    /// 先只在当前信念所在任务内搜索
    pub narrow_to_current_task: bool,
}

impl Default for MatcherSection {
    fn default() -> Self {
        Self {
            high_threshold: 0.70,
            medium_threshold: 0.40,
            narrow_to_current_task: true,
        }
    }
}

/// [tracker] 段：连续多少次不合格观察后清空信念
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    pub max_consecutive_low: u32,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            max_consecutive_low: 5,
        }
    }
}

/// [fallback] 段：回退阈值与视觉调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    pub confidence_threshold: f32,
    pub timeout_secs: u64,
    /// get/set persona 的超时
    pub restore_timeout_secs: u64,
    pub max_tokens: u32,
    pub answer_confidence: f32,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.40,
            timeout_secs: 20,
            restore_timeout_secs: 5,
            max_tokens: 256,
            answer_confidence: 0.5,
        }
    }
}

/// [vision] 段：视觉服务地址；未设置 base_url 时使用 Mock
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionSection {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for VisionSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "default".to_string(),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// 配置错误属于启动期致命错误
    pub fn validate(&self) -> Result<(), StepwiseError> {
        let m = &self.matcher;
        if !(0.0 < m.medium_threshold && m.medium_threshold < m.high_threshold && m.high_threshold <= 1.0) {
            return Err(StepwiseError::Config(format!(
                "matcher thresholds must satisfy 0 < medium < high <= 1 (got medium={}, high={})",
                m.medium_threshold, m.high_threshold
            )));
        }
        if self.tracker.max_consecutive_low == 0 {
            return Err(StepwiseError::Config(
                "tracker.max_consecutive_low must be at least 1".to_string(),
            ));
        }
        let f = &self.fallback;
        if !(0.0..=1.0).contains(&f.confidence_threshold) || !(0.0..=1.0).contains(&f.answer_confidence) {
            return Err(StepwiseError::Config(
                "fallback confidences must be within [0, 1]".to_string(),
            ));
        }
        if f.timeout_secs == 0 || f.restore_timeout_secs == 0 || self.vision.request_timeout_secs == 0 {
            return Err(StepwiseError::Config("timeouts must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn bands(&self) -> ConfidenceBands {
        ConfidenceBands {
            high: self.matcher.high_threshold,
            medium: self.matcher.medium_threshold,
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            max_consecutive_low: self.tracker.max_consecutive_low,
            qualifying_threshold: self.matcher.medium_threshold,
        }
    }

    pub fn fallback_settings(&self) -> FallbackSettings {
        FallbackSettings {
            timeout: Duration::from_secs(self.fallback.timeout_secs),
            restore_timeout: Duration::from_secs(self.fallback.restore_timeout_secs),
            max_tokens: self.fallback.max_tokens,
            answer_confidence: self.fallback.answer_confidence,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STEPWISE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEPWISE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, StepwiseError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if !path.exists() {
            return Err(StepwiseError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(config::File::from(path.clone()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEPWISE")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}
