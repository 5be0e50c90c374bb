use std::path::PathBuf;

/// 构建过程中的错误
///
/// 内容类错误只影响单个条目，编排器记录后跳过；其余错误中止当前构建。
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// YAML 格式错误、章节文件缺失等，跳过该条目继续构建
    #[error("内容错误（{path}）：{message}")]
    Content { path: PathBuf, message: String },

    /// 站点级配置无法解析，所有页面都依赖它
    #[error("配置错误：{0}")]
    Config(String),

    #[error("模板 {name} 渲染失败：{message}")]
    Template { name: String, message: String },

    #[error("无法准备输出目录 {path}：{source}")]
    BuildDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("EPUB 生成失败（{target}）：{message}")]
    Epub { target: String, message: String },

    #[error("图片处理失败（{path}）：{message}")]
    Image { path: PathBuf, message: String },

    #[error("{context}：{source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type BuildResult<T> = Result<T, BuildError>;

impl BuildError {
    pub fn content(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Content {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// 可跳过的错误：只记录日志，不中止构建
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::Content { .. } | Self::Epub { .. } | Self::Image { .. }
        )
    }
}

/// 为 io::Result 附加上下文，统一转换为 BuildError::Io
pub trait IoContext<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> BuildResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> BuildResult<T> {
        self.map_err(|e| BuildError::io(context(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_errors_are_skippable() {
        assert!(BuildError::content("a.md", "bad yaml").is_skippable());
        let fatal = BuildError::BuildDir {
            path: "build".into(),
            source: std::io::Error::other("locked"),
        };
        assert!(!fatal.is_skippable());
    }

    #[test]
    fn io_context_wraps_message() {
        let r: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let err = r.io_context(|| "写入 index.html".to_string()).unwrap_err();
        assert!(err.to_string().contains("写入 index.html"));
    }
}
