//! 核心层：状态追踪、意图识别、回退决策、回退编排、查询编排与错误类型

pub mod classifier;
pub mod decision;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod state;

pub use classifier::{detect_locale, Locale, QueryClassifier, QueryType};
pub use decision::{FallbackPolicy, FallbackReason};
pub use error::{StepwiseError, VisionError};
pub use fallback::{degraded_message, FallbackAnswer, FallbackOrchestrator, FallbackSettings};
pub use orchestrator::{Answer, AnswerSource, QueryOrchestrator};
pub use state::{BeliefState, StateTracker, TrackerConfig, Transition};
