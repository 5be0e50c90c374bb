pub mod excerpt;
pub mod frontmatter;
pub mod loader;
pub mod markdown;
pub mod novel;
pub mod visibility;

use crate::config::SeoConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Front Matter 原始字典，键按字母序保存
pub type FrontMatter = Map<String, Value>;

/// 章节 Front Matter 的类型化视图
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChapterMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub translator: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_hint: Option<String>,
    #[serde(default)]
    pub seo: SeoConfig,
    #[serde(default)]
    pub show_tags: Option<bool>,
    #[serde(default)]
    pub show_metadata: Option<bool>,
    #[serde(default)]
    pub show_translation_notes: Option<bool>,
    #[serde(default)]
    pub translation_notes: Option<String>,
    /// 章节类型：prose（默认）或 manga
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChapterMeta {
    pub fn from_front_matter(front_matter: &FrontMatter) -> Result<Self, String> {
        serde_json::from_value(Value::Object(front_matter.clone())).map_err(|e| e.to_string())
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// 章节级索引开关，未设置时返回 None 交由上级决定
    pub fn allow_indexing(&self) -> Option<bool> {
        self.seo.allow_indexing
    }
}

/// 静态页面 Front Matter 的类型化视图
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PageMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub hidden: bool,
    /// 导航位置：header 或 footer
    #[serde(default)]
    pub navigation: Option<String>,
    #[serde(default)]
    pub nav_order: Option<i64>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_hint: Option<String>,
    #[serde(default)]
    pub seo: SeoConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PageMeta {
    pub fn from_front_matter(front_matter: &FrontMatter) -> Result<Self, String> {
        serde_json::from_value(Value::Object(front_matter.clone())).map_err(|e| e.to_string())
    }

    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// 已读取的 Markdown 文档
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub front_matter: FrontMatter,
    pub body: String,
}

/// 已加载的章节，记录实际使用的语言
#[derive(Debug, Clone)]
pub struct LoadedChapter {
    pub id: String,
    pub doc: Document,
    pub meta: ChapterMeta,
    /// 实际读取的语言（译文缺失时回退到主语言）
    pub source_language: String,
    pub translation_missing: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedPage {
    pub slug: String,
    pub language: String,
    pub doc: Document,
    pub meta: PageMeta,
}
