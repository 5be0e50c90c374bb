use serde::Serialize;

/// 构建进度事件（通过 WebSocket 推送到浏览器）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    Started {
        trigger: String,
    },
    Finished {
        scope: String,
        total_ms: u64,
        pages: usize,
    },
    Failed {
        error: String,
    },
}

impl BuildEvent {
    /// 浏览器收到后需要刷新页面
    pub fn should_reload(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}
