//! 任务知识层：任务/步骤定义与只读知识库
//!
//! 目录结构：
//! ```text
//! config/tasks/
//! ├── coffee.toml     # [task] + [[steps]]
//! └── ...
//! ```

mod store;
mod types;

pub use store::{InMemoryKnowledgeStore, KnowledgeStore};
pub use types::{StepDefinition, TaskDefinition};
