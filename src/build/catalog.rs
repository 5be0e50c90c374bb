//! 全站共用的章节清单
//!
//! 每部小说每种语言只按可见性规则筛选一次，目录、导航、标签、RSS、sitemap、
//! robots、搜索索引和 EPUB 都从同一份清单取数据，保证一处隐藏的章节处处隐藏。

use crate::build::context::BuildContext;
use crate::content::novel::NovelConfig;
use crate::content::visibility::{VisibilityRules, parse_publish_date};
use crate::content::{ChapterMeta, LoadedChapter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// 一个可见章节
#[derive(Debug, Clone)]
pub struct ChapterEntry {
    pub arc_index: usize,
    pub id: String,
    /// Front Matter 标题优先，其次卷配置中的标题
    pub title: String,
    pub chapter: LoadedChapter,
}

impl ChapterEntry {
    pub fn meta(&self) -> &ChapterMeta {
        &self.chapter.meta
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.meta().published.as_deref().and_then(parse_publish_date)
    }

    /// 可以出现在 sitemap / RSS 中：非密码章节且未关闭索引
    pub fn indexable(&self, novel_allows: bool) -> bool {
        !self.meta().has_password() && self.meta().allow_indexing().unwrap_or(novel_allows)
    }
}

/// 相关章节（按共同标签数排序）
#[derive(Debug, Clone, Serialize)]
pub struct RelatedChapter {
    pub id: String,
    pub title: String,
    pub shared_tags: Vec<String>,
}

/// 小说在某种语言下的可见章节，按卷顺序排列
#[derive(Debug, Clone)]
pub struct Edition {
    pub language: String,
    pub chapters: Vec<ChapterEntry>,
}

impl Edition {
    /// 按当前可见性规则加载；读不出的章节记录警告后跳过
    pub fn load(ctx: &BuildContext, novel: &NovelConfig, language: &str) -> Self {
        let rules = ctx.rules();
        let loader = ctx.loader();
        let mut chapters = Vec::new();
        for (arc_index, chapter_ref) in novel.chapter_refs() {
            let chapter = match loader.load_chapter(novel, &chapter_ref.id, language) {
                Ok(chapter) => chapter,
                Err(e) => {
                    tracing::warn!("跳过章节 {}/{}：{e}", novel.slug, chapter_ref.id);
                    continue;
                }
            };
            if !rules.chapter_visible(&chapter.meta) {
                log_skipped(&rules, &novel.slug, &chapter);
                continue;
            }
            let title = chapter
                .meta
                .title
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| chapter_ref.title.clone());
            chapters.push(ChapterEntry {
                arc_index,
                id: chapter_ref.id.clone(),
                title,
                chapter,
            });
        }
        Self {
            language: language.to_string(),
            chapters,
        }
    }

    pub fn get(&self, chapter_id: &str) -> Option<&ChapterEntry> {
        self.chapters.iter().find(|c| c.id == chapter_id)
    }

    pub fn contains(&self, chapter_id: &str) -> bool {
        self.get(chapter_id).is_some()
    }

    /// 上一章与下一章（只在可见章节之间跳转，跨卷连续）
    pub fn neighbours(&self, chapter_id: &str) -> (Option<&ChapterEntry>, Option<&ChapterEntry>) {
        let Some(index) = self.chapters.iter().position(|c| c.id == chapter_id) else {
            return (None, None);
        };
        let prev = index.checked_sub(1).and_then(|i| self.chapters.get(i));
        (prev, self.chapters.get(index + 1))
    }

    pub fn arc_chapters(&self, arc_index: usize) -> impl Iterator<Item = &ChapterEntry> {
        self.chapters.iter().filter(move |c| c.arc_index == arc_index)
    }

    /// 标签 → 章节；译文缺失的章节不参与，它们的标签页在该语言下不存在
    pub fn tags(&self) -> BTreeMap<String, Vec<&ChapterEntry>> {
        let mut tags: BTreeMap<String, Vec<&ChapterEntry>> = BTreeMap::new();
        for chapter in self.chapters.iter().filter(|c| !c.chapter.translation_missing) {
            for tag in chapter.meta().tags() {
                tags.entry(tag.clone()).or_default().push(chapter);
            }
        }
        tags
    }

    /// 最近一次已发布（不在未来）的章节时间
    pub fn latest_published(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.chapters
            .iter()
            .filter_map(ChapterEntry::published_at)
            .filter(|published| *published <= now)
            .max()
    }

    /// 共同标签最多的若干章节
    pub fn related(&self, chapter_id: &str, max_results: usize) -> Vec<RelatedChapter> {
        let Some(current) = self.get(chapter_id) else {
            return Vec::new();
        };
        let current_tags = current.meta().tags();
        if current_tags.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<RelatedChapter> = self
            .chapters
            .iter()
            .filter(|c| c.id != chapter_id)
            .filter_map(|c| {
                let shared: Vec<String> = c
                    .meta()
                    .tags()
                    .iter()
                    .filter(|t| current_tags.contains(t))
                    .cloned()
                    .collect();
                (!shared.is_empty()).then(|| RelatedChapter {
                    id: c.id.clone(),
                    title: c.title.clone(),
                    shared_tags: shared,
                })
            })
            .collect();
        // 稳定排序，同分时保持阅读顺序
        scored.sort_by(|a, b| b.shared_tags.len().cmp(&a.shared_tags.len()));
        scored.truncate(max_results);
        scored
    }
}

fn log_skipped(rules: &VisibilityRules, novel_slug: &str, chapter: &LoadedChapter) {
    let meta = &chapter.meta;
    if meta.hidden {
        tracing::debug!("跳过隐藏章节：{novel_slug}/{}", chapter.id);
    } else if meta.draft || matches!(meta.status.as_deref(), Some("draft") | Some("review")) {
        tracing::info!("跳过草稿章节：{novel_slug}/{}", chapter.id);
    } else if crate::content::visibility::is_scheduled_future(meta, rules.now) {
        tracing::info!(
            "跳过定时发布章节：{novel_slug}/{}（发布时间 {}）",
            chapter.id,
            meta.published.as_deref().unwrap_or("未知")
        );
    } else {
        tracing::info!("跳过章节：{novel_slug}/{}", chapter.id);
    }
}

/// 一部小说及其各语言版本
#[derive(Debug, Clone)]
pub struct NovelEntry {
    pub config: NovelConfig,
    pub languages: Vec<String>,
    pub editions: Vec<Edition>,
}

impl NovelEntry {
    pub fn load(ctx: &BuildContext, config: NovelConfig) -> Self {
        let languages = ctx.loader().novel_languages(&config);
        let editions = languages
            .iter()
            .map(|lang| Edition::load(ctx, &config, lang))
            .collect();
        Self {
            config,
            languages,
            editions,
        }
    }

    pub fn slug(&self) -> &str {
        &self.config.slug
    }

    pub fn edition(&self, language: &str) -> Option<&Edition> {
        self.editions.iter().find(|e| e.language == language)
    }

    pub fn primary_edition(&self) -> Option<&Edition> {
        self.edition(self.config.primary_language())
    }

    /// 小说级索引开关（小说设置优先，其次站点设置）
    pub fn allows_indexing(&self, site_allows: bool) -> bool {
        self.config.allows_indexing().unwrap_or(site_allows)
    }
}

/// 本次构建的全部小说
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub novels: Vec<NovelEntry>,
}

impl Catalog {
    pub fn load(ctx: &BuildContext) -> Self {
        let loader = ctx.loader();
        let mut novels = Vec::new();
        for slug in loader.list_novels() {
            match loader.load_novel_config(&slug) {
                Ok(config) => novels.push(NovelEntry::load(ctx, config)),
                Err(e) => tracing::warn!("跳过小说 {slug}：{e}"),
            }
        }
        Self { novels }
    }

    pub fn get(&self, slug: &str) -> Option<&NovelEntry> {
        self.novels.iter().find(|n| n.slug() == slug)
    }

    pub fn chapter_count(&self) -> usize {
        self.novels
            .iter()
            .flat_map(|n| &n.editions)
            .map(|e| e.chapters.len())
            .sum()
    }

    /// 所有小说出现过的语言，按字母序
    pub fn languages(&self) -> Vec<String> {
        let mut langs: Vec<String> = self
            .novels
            .iter()
            .flat_map(|n| n.languages.iter().cloned())
            .collect();
        langs.sort();
        langs.dedup();
        langs
    }
}
