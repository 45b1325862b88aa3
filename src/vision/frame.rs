//! 图片缓存：只保留最近一帧
//!
//! 感知循环每轮观察后 put，新帧覆盖旧帧，不排队。回退需要图片但尚无缓存时，降级为纯文本。

use std::path::Path;
use std::sync::{Arc, RwLock};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

/// 一帧图片（编码后的字节 + MIME + 采集时间）
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFrame {
    pub data: Arc<Vec<u8>>,
    pub mime_type: String,
    pub captured_at: DateTime<Utc>,
}

impl CachedFrame {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self::captured_at(data, mime_type, Utc::now())
    }

    pub fn captured_at(
        data: Vec<u8>,
        mime_type: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data: Arc::new(data),
            mime_type: mime_type.into(),
            captured_at,
        }
    }

    /// 从文件读取，MIME 由扩展名推断
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Ok(Self::new(data, mime_from_extension(path)))
    }

    /// `data:<mime>;base64,<...>`，供视觉服务直接使用
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(self.data.as_slice()))
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.captured_at
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// 单槽图片缓存
#[derive(Debug, Default)]
pub struct ImageCache {
    slot: RwLock<Option<CachedFrame>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, frame: CachedFrame) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(frame);
    }

    pub fn get(&self) -> Option<CachedFrame> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
