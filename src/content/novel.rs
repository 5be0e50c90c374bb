use crate::config::{NewChapterTags, SeoConfig};
use crate::project::DEFAULT_LANGUAGE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 小说配置（content/<slug>/config.yaml）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NovelConfig {
    /// 目录名，加载后填入
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 作者，可以是字符串或 {name, username}
    #[serde(default)]
    pub author: Value,
    #[serde(default)]
    pub primary_language: Option<String>,
    #[serde(default)]
    pub languages: NovelLanguages,
    #[serde(default)]
    pub arcs: Vec<ArcConfig>,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub glossary: FeatureToggle,
    #[serde(default)]
    pub comments: Value,
    #[serde(default)]
    pub front_page: NovelFrontPage,
    #[serde(default)]
    pub seo: SeoConfig,
    #[serde(default)]
    pub new_chapter_tags: NewChapterTags,
    #[serde(default)]
    pub display: DisplayConfig,
    /// 小说类型：prose（默认）或 manga
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NovelLanguages {
    #[serde(default)]
    pub available: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArcConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_art: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChapterRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadsConfig {
    #[serde(default = "default_true")]
    pub epub_enabled: bool,
    #[serde(default = "default_true")]
    pub include_arcs: bool,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            epub_enabled: true,
            include_arcs: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeatureToggle {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NovelFrontPage {
    #[serde(default = "default_true")]
    pub show_on_front_page: bool,
    #[serde(default)]
    pub cover_art: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for NovelFrontPage {
    fn default() -> Self {
        Self {
            show_on_front_page: true,
            cover_art: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_tags: bool,
    #[serde(default = "default_true")]
    pub show_metadata: bool,
    #[serde(default = "default_true")]
    pub show_translation_notes: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_tags: true,
            show_metadata: true,
            show_translation_notes: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl NovelConfig {
    pub fn primary_language(&self) -> &str {
        self.primary_language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() { &self.slug } else { &self.title }
    }

    pub fn author_name(&self) -> Option<&str> {
        match &self.author {
            Value::String(name) => Some(name.as_str()),
            Value::Object(map) => map.get("name").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn author_username(&self) -> Option<&str> {
        self.author.get("username").and_then(Value::as_str)
    }

    pub fn is_manga(&self) -> bool {
        self.kind.as_deref() == Some("manga")
    }

    pub fn allows_indexing(&self) -> Option<bool> {
        self.seo.allow_indexing
    }

    /// 按阅读顺序展开所有章节引用，附带所在卷的序号
    pub fn chapter_refs(&self) -> impl Iterator<Item = (usize, &ChapterRef)> {
        self.arcs
            .iter()
            .enumerate()
            .flat_map(|(arc_index, arc)| arc.chapters.iter().map(move |c| (arc_index, c)))
    }

    pub fn contains_chapter(&self, chapter_id: &str) -> bool {
        self.chapter_refs().any(|(_, c)| c.id == chapter_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
title: My Novel
author:
  name: Jane
  username: jdoe
primary_language: en
arcs:
  - title: Arc One
    chapters:
      - id: chapter-1
        title: Beginning
      - id: chapter-2
        title: Middle
  - title: Arc Two
    chapters:
      - id: chapter-3
        title: End
downloads:
  include_arcs: false
"#;

    #[test]
    fn parses_novel_config() {
        let novel: NovelConfig = crate::yaml::from_str(CONFIG).unwrap();
        assert_eq!(novel.title, "My Novel");
        assert_eq!(novel.author_name(), Some("Jane"));
        assert_eq!(novel.author_username(), Some("jdoe"));
        assert_eq!(novel.arcs.len(), 2);
        assert!(novel.downloads.epub_enabled);
        assert!(!novel.downloads.include_arcs);
        assert!(novel.front_page.show_on_front_page);
        assert!(novel.display.show_tags);
    }

    #[test]
    fn chapter_refs_are_in_reading_order() {
        let novel: NovelConfig = crate::yaml::from_str(CONFIG).unwrap();
        let ids: Vec<(usize, &str)> = novel
            .chapter_refs()
            .map(|(arc, c)| (arc, c.id.as_str()))
            .collect();
        assert_eq!(ids, vec![(0, "chapter-1"), (0, "chapter-2"), (1, "chapter-3")]);
        assert!(novel.contains_chapter("chapter-3"));
        assert!(!novel.contains_chapter("chapter-9"));
    }

    #[test]
    fn string_author_and_default_language() {
        let novel: NovelConfig = crate::yaml::from_str("title: X\nauthor: Solo\n").unwrap();
        assert_eq!(novel.author_name(), Some("Solo"));
        assert_eq!(novel.primary_language(), "en");
    }
}
