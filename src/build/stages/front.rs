use crate::build::catalog::{Catalog, NovelEntry};
use crate::build::context::BuildContext;
use crate::build::error::BuildResult;
use crate::build::meta::{self, PageChrome, PageKind};
use crate::build::stages::assets::CoverArt;
use crate::config::SiteConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};

/// 首页排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMethod {
    RecentUpdate,
    Alphabetical,
    Original,
}

impl SortMethod {
    /// 未设置或无法识别时按最近更新排序
    pub fn from_config(value: Option<&str>) -> Self {
        match value {
            Some("alphabetical") => Self::Alphabetical,
            Some("original") => Self::Original,
            Some("recent_update") | None => Self::RecentUpdate,
            Some(other) => {
                tracing::warn!("未知的首页排序方式 {other}，使用 recent_update");
                Self::RecentUpdate
            }
        }
    }
}

/// 小说最近一次已发布章节的时间（所有语言中最晚的一次）
pub fn latest_update(novel: &NovelEntry, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    novel
        .editions
        .iter()
        .filter_map(|e| e.latest_published(now))
        .max()
}

/// 首页展示的小说：过滤、排序、置顶
pub fn front_page_order<'a>(site: &SiteConfig, catalog: &'a Catalog, now: DateTime<Utc>) -> Vec<&'a NovelEntry> {
    let mut novels: Vec<&NovelEntry> = catalog
        .novels
        .iter()
        .filter(|n| n.config.front_page.show_on_front_page)
        .collect();

    match SortMethod::from_config(site.front_page.story_sort_method.as_deref()) {
        // 没有已发布章节的排在最后
        SortMethod::RecentUpdate => novels.sort_by(|a, b| latest_update(b, now).cmp(&latest_update(a, now))),
        SortMethod::Alphabetical => {
            novels.sort_by_key(|n| n.config.display_title().to_lowercase());
        }
        SortMethod::Original => {}
    }

    let featured = &site.front_page.featured_order;
    if !featured.is_empty() {
        let mut ordered: Vec<&NovelEntry> = featured
            .iter()
            .filter_map(|slug| novels.iter().find(|n| n.slug() == slug).copied())
            .collect();
        ordered.extend(novels.iter().filter(|n| !featured.iter().any(|s| s == n.slug())));
        novels = ordered;
    }
    novels
}

#[derive(Debug, Clone, Serialize)]
struct NovelCard {
    slug: String,
    title: String,
    description: String,
    author: Option<String>,
    cover_art: Option<String>,
    primary_language: String,
    languages: Vec<String>,
    chapter_count: usize,
    latest_update: Option<String>,
    toc_url: String,
}

fn novel_card(novel: &NovelEntry, covers: &HashMap<String, CoverArt>, now: DateTime<Utc>) -> NovelCard {
    let primary = novel.config.primary_language().to_string();
    NovelCard {
        slug: novel.slug().to_string(),
        title: novel.config.display_title().to_string(),
        description: novel.config.description.clone(),
        author: novel.config.author_name().map(str::to_string),
        cover_art: covers.get(novel.slug()).and_then(|c| c.story.clone()),
        chapter_count: novel.primary_edition().map(|e| e.chapters.len()).unwrap_or(0),
        latest_update: latest_update(novel, now).map(|d| d.format("%Y-%m-%d").to_string()),
        toc_url: format!("{}/{primary}/toc/", novel.slug()),
        primary_language: primary,
        languages: novel.languages.clone(),
    }
}

/// 站点首页
pub fn render_front_page(
    ctx: &mut BuildContext,
    catalog: &Catalog,
    covers: &HashMap<String, CoverArt>,
) -> BuildResult<()> {
    let site = ctx.settings.site.clone();
    let ordered = front_page_order(&site, catalog, ctx.now);
    let cards: Vec<NovelCard> = ordered.iter().map(|n| novel_card(n, covers, ctx.now)).collect();

    let primary_config = &site.front_page.primary_stories;
    let max_count = primary_config.max_count.unwrap_or(3);
    let (primary, additional) = if primary_config.limit_enabled && cards.len() > max_count {
        (&cards[..max_count], &cards[max_count..])
    } else {
        (&cards[..], &cards[..0])
    };

    let client_data: Vec<Value> = catalog
        .novels
        .iter()
        .map(|n| json!({ "slug": n.slug(), "title": n.config.display_title() }))
        .collect();

    let language = site.default_language().to_string();
    let base = meta::page_vars(
        ctx,
        0,
        &language,
        PageChrome {
            kind: PageKind::Site,
            novel: None,
            overrides: None,
            seo: None,
            title: &site.site_name,
            path: "",
        },
    );
    let vars = meta::with_vars(
        base,
        json!({
            "primary_novels": primary,
            "additional_novels": additional,
            "novel_data_json": serde_json::to_string(&client_data).unwrap_or_default(),
            "front_page_title": &site.front_page.title_override,
            "front_page_subtitle": &site.front_page.subtitle,
        }),
    );
    let output = ctx.render(None, "index.html", &vars)?;
    ctx.write_html("index.html", output)?;
    tracing::info!("已生成首页（{} 部小说）", cards.len());
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct StoryContribution {
    slug: String,
    title: String,
    description: String,
    url: String,
    role: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ChapterContribution {
    novel_slug: String,
    novel_title: String,
    chapter_id: String,
    title: String,
    role: &'static str,
    published: Option<String>,
    url: String,
}

#[derive(Debug, Default)]
struct Contributions {
    stories: Vec<StoryContribution>,
    chapters: Vec<ChapterContribution>,
}

/// 按作者显示名或用户名收集贡献；章节只看主语言版本
fn collect_contributions(catalog: &Catalog, names: &[&str]) -> Contributions {
    let matches = |value: Option<&str>| value.is_some_and(|v| names.contains(&v));
    let mut found = Contributions::default();
    for novel in &catalog.novels {
        if matches(novel.config.author_name()) || matches(novel.config.author_username()) {
            found.stories.push(StoryContribution {
                slug: novel.slug().to_string(),
                title: novel.config.display_title().to_string(),
                description: novel.config.description.clone(),
                url: format!("{}/{}/toc/", novel.slug(), novel.config.primary_language()),
                role: "作者",
            });
        }
        let Some(edition) = novel.primary_edition() else {
            continue;
        };
        for chapter in &edition.chapters {
            let meta = chapter.meta();
            for (value, role) in [(meta.author.as_deref(), "作者"), (meta.translator.as_deref(), "译者")] {
                if matches(value) {
                    found.chapters.push(ChapterContribution {
                        novel_slug: novel.slug().to_string(),
                        novel_title: novel.config.display_title().to_string(),
                        chapter_id: chapter.id.clone(),
                        title: chapter.title.clone(),
                        role,
                        published: meta.published.clone(),
                        url: format!("{}/{}/{}/", novel.slug(), edition.language, chapter.id),
                    });
                }
            }
        }
    }
    // 最新的在前，没有日期的排在最后
    found
        .chapters
        .sort_by(|a, b| b.published.as_deref().unwrap_or("").cmp(a.published.as_deref().unwrap_or("")));
    found
}

/// 作者索引页与每位作者的详情页；authors.yaml 为空时不生成
pub fn render_authors(ctx: &mut BuildContext, catalog: &Catalog) -> BuildResult<usize> {
    let authors = ctx.settings.authors.authors.clone();
    if authors.is_empty() {
        return Ok(0);
    }
    let site = ctx.settings.site.clone();
    let language = site.default_language().to_string();
    let max_chapters = site
        .extra
        .get("author_pages")
        .and_then(|a| a.get("max_recent_chapters"))
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(20);

    let title = "作者".to_string();
    let base = meta::page_vars(
        ctx,
        1,
        &language,
        PageChrome {
            kind: PageKind::Site,
            novel: None,
            overrides: None,
            seo: None,
            title: &title,
            path: "authors/",
        },
    );
    let vars = meta::with_vars(base, json!({ "authors": &authors }));
    let output = ctx.render(None, "authors.html", &vars)?;
    ctx.write_html("authors/index.html", output)?;

    let mut written = 1;
    for (username, profile) in &authors {
        let display = if profile.name.is_empty() { username.as_str() } else { profile.name.as_str() };
        let mut contributions = collect_contributions(catalog, &[display, username.as_str()]);
        if max_chapters > 0 {
            contributions.chapters.truncate(max_chapters);
        }
        let path = format!("authors/{username}/");
        let title = format!("{display} - 作者");
        let base = meta::page_vars(
            ctx,
            2,
            &language,
            PageChrome {
                kind: PageKind::Site,
                novel: None,
                overrides: None,
                seo: None,
                title: &title,
                path: &path,
            },
        );
        let vars = meta::with_vars(
            base,
            json!({
                "username": username,
                "author": profile,
                "stories": contributions.stories,
                "chapters": contributions.chapters,
                "max_chapters": max_chapters,
            }),
        );
        let output = ctx.render(None, "author.html", &vars)?;
        ctx.write_html(&format!("{path}index.html"), output)?;
        written += 1;
    }
    tracing::info!("已生成 {} 个作者页面", written);
    Ok(written)
}

/// 各小说的封面，按小说 slug 索引
pub fn process_covers(ctx: &BuildContext, catalog: &Catalog) -> BuildResult<HashMap<String, CoverArt>> {
    let mut covers = HashMap::new();
    for novel in &catalog.novels {
        let art = crate::build::stages::assets::process_cover_art(ctx, &novel.config)?;
        covers.insert(novel.slug().to_string(), art);
    }
    Ok(covers)
}

/// 卷封面按卷序号转成模板可用的映射
pub fn arc_covers(covers: &HashMap<String, CoverArt>, novel_slug: &str) -> BTreeMap<String, String> {
    covers
        .get(novel_slug)
        .map(|c| c.arcs.iter().map(|(i, p)| (i.to_string(), p.clone())).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::test_helpers::{ProjectBuilder, chapter_md};

    fn project(site_extra: &str) -> crate::test_helpers::TestProject {
        let site = format!("site_name: Test\nsite_url: https://example.com\n{site_extra}");
        ProjectBuilder::new()
            .site_config(&site)
            .novel_config("alpha", "title: Zeta Story\narcs:\n  - title: A\n    chapters:\n      - id: c1\n")
            .chapter("alpha", "c1", &chapter_md("A1", "published: 2020-01-01\n"))
            .novel_config("beta", "title: Alpha Story\narcs:\n  - title: A\n    chapters:\n      - id: c1\n")
            .chapter("beta", "c1", &chapter_md("B1", "published: 2023-05-01\nauthor: Jane\n"))
            .novel_config("gamma", "title: Hidden\nfront_page:\n  show_on_front_page: false\n")
            .build()
    }

    fn order(site_extra: &str) -> Vec<String> {
        let project = project(site_extra);
        let ctx = project.context(BuildFlags::default());
        let catalog = Catalog::load(&ctx);
        front_page_order(&ctx.settings.site, &catalog, ctx.now)
            .iter()
            .map(|n| n.slug().to_string())
            .collect()
    }

    #[test]
    fn sort_methods() {
        assert_eq!(order(""), vec!["beta", "alpha"]);
        assert_eq!(order("front_page:\n  story_sort_method: alphabetical\n"), vec!["beta", "alpha"]);
        assert_eq!(order("front_page:\n  story_sort_method: original\n"), vec!["alpha", "beta"]);
        assert_eq!(
            order("front_page:\n  story_sort_method: original\n  featured_order: [beta, missing]\n"),
            vec!["beta", "alpha"]
        );
    }

    #[test]
    fn author_pages_list_contributions() {
        let project = project("");
        project.write("authors.yaml", "authors:\n  jdoe:\n    name: Jane\n");
        let mut ctx = project.context(BuildFlags::default().fast());
        let catalog = Catalog::load(&ctx);
        assert_eq!(render_authors(&mut ctx, &catalog).unwrap(), 2);
        let page = project.read_output("authors/jdoe/index.html");
        assert!(page.contains("B1"), "{page}");
    }
}
