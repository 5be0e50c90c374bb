use crate::build::catalog::Catalog;
use crate::build::context::BuildContext;
use crate::build::error::{BuildError, BuildResult};
use crate::build::meta::{self, PageChrome, PageKind};
use crate::content::excerpt::{strip_html_tags, truncate_chars};
use crate::content::markdown::render_markdown;
use serde::Serialize;
use serde_json::json;

const MAX_TEXT_CHARS: usize = 2000;
pub const SEARCH_INDEX_FILE: &str = "search_index.json";

/// 客户端全文搜索的索引条目
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
    pub id: String,
    pub title: String,
    pub story: String,
    pub story_slug: String,
    pub language: String,
    pub tags: Vec<String>,
    pub published: String,
    pub url: String,
    pub text: String,
}

/// 所有可见、非密码章节；译文缺失的章节不重复收录主语言正文
pub fn build_index(catalog: &Catalog) -> Vec<SearchEntry> {
    let mut entries = Vec::new();
    for novel in &catalog.novels {
        for edition in &novel.editions {
            for chapter in &edition.chapters {
                if chapter.meta().has_password() || chapter.chapter.translation_missing {
                    continue;
                }
                let text = strip_html_tags(&render_markdown(&chapter.chapter.doc.body));
                entries.push(SearchEntry {
                    id: format!("{}/{}/{}", novel.slug(), edition.language, chapter.id),
                    title: chapter.title.clone(),
                    story: novel.config.display_title().to_string(),
                    story_slug: novel.slug().to_string(),
                    language: edition.language.clone(),
                    tags: chapter.meta().tags().to_vec(),
                    published: chapter.meta().published.clone().unwrap_or_default(),
                    url: format!("{}/{}/{}/", novel.slug(), edition.language, chapter.id),
                    text: truncate_chars(text.trim(), MAX_TEXT_CHARS),
                });
            }
        }
    }
    entries
}

/// 写出 search_index.json 与搜索页
pub fn generate(ctx: &mut BuildContext, catalog: &Catalog) -> BuildResult<usize> {
    let entries = build_index(catalog);
    let json = serde_json::to_vec(&entries).map_err(|e| BuildError::Io {
        context: format!("序列化 {SEARCH_INDEX_FILE} 失败"),
        source: e.into(),
    })?;
    ctx.write_output(SEARCH_INDEX_FILE, &json)?;

    let site = ctx.settings.site.clone();
    let title = format!("搜索 | {}", site.site_name);
    let base = meta::page_vars(
        ctx,
        1,
        site.default_language(),
        PageChrome {
            kind: PageKind::Site,
            novel: None,
            overrides: None,
            seo: None,
            title: &title,
            path: "search/",
        },
    );
    let vars = meta::with_vars(
        base,
        json!({
            "search_index_url": format!("../{SEARCH_INDEX_FILE}"),
            "novels": catalog.novels.iter().map(|n| json!({
                "slug": n.slug(),
                "title": n.config.display_title(),
            })).collect::<Vec<_>>(),
        }),
    );
    let output = ctx.render(None, "search.html", &vars)?;
    ctx.write_html("search/index.html", output)?;
    tracing::info!("已生成搜索索引（{} 条）", entries.len());
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::test_helpers::{ProjectBuilder, chapter_md};

    #[test]
    fn index_skips_protected_and_invisible_chapters() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1", "c2", "c3"])
            .chapter("n", "c1", &chapter_md("One", "tags: [a]\npublished: 2024-01-01\n"))
            .chapter("n", "c2", &chapter_md("Two", "password: pw\n"))
            .chapter("n", "c3", &chapter_md("Three", "hidden: true\n"))
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let catalog = Catalog::load(&ctx);
        assert_eq!(generate(&mut ctx, &catalog).unwrap(), 1);

        let index: Vec<serde_json::Value> =
            serde_json::from_str(&project.read_output(SEARCH_INDEX_FILE)).unwrap();
        assert_eq!(index[0]["id"], "n/en/c1");
        assert_eq!(index[0]["storySlug"], "n");
        assert_eq!(index[0]["url"], "n/en/c1/");
        assert!(index[0]["text"].as_str().unwrap().contains("One body text."));
        assert!(project.build_path("search/index.html").is_file());
    }

    #[test]
    fn text_is_truncated() {
        let long = "word ".repeat(1000);
        let project = ProjectBuilder::new()
            .novel("n", &["c1"])
            .chapter("n", "c1", &format!("---\ntitle: Long\n---\n{long}"))
            .build();
        let ctx = project.context(BuildFlags::default());
        let entries = build_index(&Catalog::load(&ctx));
        assert_eq!(entries[0].text.chars().count(), MAX_TEXT_CHARS);
    }
}
