//! 视觉层：视觉模型客户端抽象与实现（HTTP / Mock）、最近一帧图片缓存

mod frame;
pub mod http;
pub mod mock;
mod traits;

pub use frame::{CachedFrame, ImageCache};
pub use http::HttpVisionClient;
pub use mock::{MockBehavior, MockVisionClient};
pub use traits::{Message, PersonaToken, Role, VisionClient};
