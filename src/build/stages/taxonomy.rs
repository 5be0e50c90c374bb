use crate::build::catalog::{ChapterEntry, NovelEntry};
use crate::build::context::BuildContext;
use crate::build::error::BuildResult;
use crate::build::meta::{self, PageChrome, PageKind};
use crate::template::filters::slugify_tag;
use serde::Serialize;
use serde_json::json;

/// 标签下的章节
#[derive(Debug, Clone, Serialize)]
pub struct TaggedChapter {
    pub id: String,
    pub title: String,
    pub url: String,
    pub published: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagSummary {
    pub name: String,
    pub slug: String,
    pub url: String,
    pub count: usize,
}

fn tagged(chapter: &ChapterEntry, prefix: &str) -> TaggedChapter {
    TaggedChapter {
        id: chapter.id.clone(),
        title: chapter.title.clone(),
        url: format!("{prefix}{}/", chapter.id),
        published: chapter.meta().published.clone(),
    }
}

/// 每种语言一份标签索引与每个标签的章节列表，返回写出的页面数
pub fn render_tags(ctx: &mut BuildContext, novel: &NovelEntry) -> BuildResult<usize> {
    let config = &novel.config;
    let mut written = 0;

    for edition in &novel.editions {
        let language = edition.language.as_str();
        let tags = edition.tags();
        if tags.is_empty() {
            continue;
        }

        let summaries: Vec<TagSummary> = tags
            .iter()
            .map(|(name, chapters)| {
                let slug = slugify_tag(name.clone());
                TagSummary {
                    url: format!("{slug}/"),
                    name: name.clone(),
                    slug,
                    count: chapters.len(),
                }
            })
            .collect();

        let title = format!("{} - 标签", config.display_title());
        let index_path = format!("{}/{language}/tags/", config.slug);
        let base = meta::page_vars(
            ctx,
            3,
            language,
            PageChrome {
                kind: PageKind::Site,
                novel: Some(config),
                overrides: None,
                seo: Some(&config.seo),
                title: &title,
                path: &index_path,
            },
        );
        let vars = meta::with_vars(
            base,
            json!({
                "novel": config,
                "novel_slug": config.slug,
                "tags": summaries,
                "available_languages": novel.languages,
            }),
        );
        let output = ctx.render(Some(config), "tags_index.html", &vars)?;
        ctx.write_html(&format!("{index_path}index.html"), output)?;
        written += 1;

        for summary in &summaries {
            let chapters: Vec<TaggedChapter> = tags
                .get(&summary.name)
                .map(|list| list.iter().map(|c| tagged(c, "../../")).collect())
                .unwrap_or_default();
            let title = format!("{} - {}", summary.name, config.display_title());
            let path = format!("{index_path}{}/", summary.slug);
            let base = meta::page_vars(
                ctx,
                4,
                language,
                PageChrome {
                    kind: PageKind::Site,
                    novel: Some(config),
                    overrides: None,
                    seo: Some(&config.seo),
                    title: &title,
                    path: &path,
                },
            );
            let vars = meta::with_vars(
                base,
                json!({
                    "novel": config,
                    "novel_slug": config.slug,
                    "tag": summary.name,
                    "tag_slug": summary.slug,
                    "chapters": chapters,
                }),
            );
            let output = ctx.render(Some(config), "tag_page.html", &vars)?;
            ctx.write_html(&format!("{path}index.html"), output)?;
            written += 1;
        }
        tracing::debug!("已生成 {}/{language} 的 {} 个标签页", config.slug, summaries.len());
    }
    Ok(written)
}
