use crate::build::catalog::{Catalog, ChapterEntry, NovelEntry};
use crate::build::context::BuildContext;
use crate::build::error::BuildResult;
use crate::config::SiteConfig;
use crate::content::excerpt::extract_excerpt;
use crate::content::markdown::render_markdown;
use crate::template::filters::slugify_tag;
use chrono::{DateTime, Utc};

const RSS_EXCERPT_CHARS: usize = 300;

/// 构建收尾：robots.txt、sitemap.xml、全站与各小说的 RSS
///
/// 所有条目都取自同一份章节清单，与目录、导航保持一致。
pub fn finalize(ctx: &BuildContext, catalog: &Catalog) -> BuildResult<()> {
    let site = &ctx.settings.site;

    ctx.write_output("robots.txt", robots_txt(site, catalog).as_bytes())?;
    tracing::info!("已生成 robots.txt");

    ctx.write_output("sitemap.xml", sitemap_xml(ctx, catalog).as_bytes())?;
    tracing::info!("已生成 sitemap.xml");

    let items = feed_items(site, catalog.novels.iter().filter(|n| n.allows_indexing(site.allows_indexing())));
    let site_feed = rss_xml(
        &site.site_name,
        &site.site_description,
        &format!("{}/", site.base_url()),
        &format!("{}/rss.xml", site.base_url()),
        &items,
        site.rss.max_items,
    );
    ctx.write_output("rss.xml", site_feed.as_bytes())?;

    for novel in &catalog.novels {
        let items = feed_items(site, std::iter::once(novel));
        let feed = rss_xml(
            novel.config.display_title(),
            &novel.config.description,
            &format!("{}/{}/", site.base_url(), novel.slug()),
            &format!("{}/{}/rss.xml", site.base_url(), novel.slug()),
            &items,
            site.rss.max_items,
        );
        ctx.write_output(&format!("{}/rss.xml", novel.slug()), feed.as_bytes())?;
    }
    tracing::info!("已生成 RSS feed（{} 部小说）", catalog.novels.len());
    Ok(())
}

pub fn robots_txt(site: &SiteConfig, catalog: &Catalog) -> String {
    let mut lines = vec!["# robots.txt".to_string()];
    if !site.base_url().is_empty() {
        lines.push(format!("Sitemap: {}/sitemap.xml", site.base_url()));
        lines.push(String::new());
    }
    lines.push("User-agent: *".to_string());

    if !site.allows_indexing() {
        lines.push("Disallow: /".to_string());
        lines.push(String::new());
        return lines.join("\n");
    }
    lines.push("Allow: /".to_string());

    let mut disallowed: Vec<String> = Vec::new();
    for novel in &catalog.novels {
        let novel_allows = novel.allows_indexing(true);
        if !novel_allows {
            disallowed.push(format!("Disallow: /{}/", novel.slug()));
            continue;
        }
        for edition in &novel.editions {
            for chapter in edition.chapters.iter().filter(|c| !c.indexable(novel_allows)) {
                let line = format!("Disallow: /{}/{}/{}/", novel.slug(), edition.language, chapter.id);
                if !disallowed.contains(&line) {
                    disallowed.push(line);
                }
            }
        }
    }
    lines.extend(disallowed);
    lines.push(String::new());
    lines.join("\n")
}

fn url_entry(loc: &str, changefreq: &str, priority: &str, lastmod: Option<String>) -> String {
    let lastmod = lastmod
        .map(|d| format!("\n    <lastmod>{d}</lastmod>"))
        .unwrap_or_default();
    format!(
        "  <url>\n    <loc>{}</loc>\n    <changefreq>{changefreq}</changefreq>\n    <priority>{priority}</priority>{lastmod}\n  </url>",
        xml_escape(loc)
    )
}

pub fn sitemap_xml(ctx: &BuildContext, catalog: &Catalog) -> String {
    let site = &ctx.settings.site;
    let base = site.base_url();
    let mut entries = Vec::new();

    if !base.is_empty() {
        entries.push(url_entry(&format!("{base}/"), "weekly", "1.0", None));
        for language in site.available_languages() {
            let index = if language == site.default_language() {
                format!("{base}/pages/")
            } else {
                format!("{base}/pages/{language}/")
            };
            entries.push(url_entry(&index, "weekly", "0.7", None));
        }

        let loader = ctx.loader();
        let rules = ctx.rules();
        for slug in loader.list_pages() {
            for language in loader.page_languages(&slug, &site.available_languages(), site.default_language()) {
                let Ok(page) = loader.load_page(&slug, &language, site.default_language()) else {
                    continue;
                };
                if !rules.page_visible(&page.meta)
                    || page.meta.has_password()
                    || page.meta.seo.allow_indexing == Some(false)
                {
                    continue;
                }
                entries.push(url_entry(&format!("{base}/{slug}/{language}/"), "monthly", "0.6", None));
            }
        }

        for novel in &catalog.novels {
            let novel_allows = novel.allows_indexing(site.allows_indexing());
            if !novel_allows {
                continue;
            }
            for edition in &novel.editions {
                let prefix = format!("{base}/{}/{}", novel.slug(), edition.language);
                entries.push(url_entry(&format!("{prefix}/toc/"), "weekly", "0.8", None));
                for chapter in edition.chapters.iter().filter(|c| c.indexable(novel_allows)) {
                    let lastmod = chapter.published_at().map(|d| d.format("%Y-%m-%d").to_string());
                    entries.push(url_entry(&format!("{prefix}/{}/", chapter.id), "monthly", "0.7", lastmod));
                }
                for tag in edition.tags().keys() {
                    let loc = format!("{prefix}/tags/{}/", slugify_tag(tag.clone()));
                    entries.push(url_entry(&loc, "monthly", "0.5", None));
                }
            }
        }
    }

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
    for entry in entries {
        xml.push_str(&entry);
        xml.push('\n');
    }
    xml.push_str("</urlset>\n");
    xml
}

/// RSS 条目
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: DateTime<Utc>,
}

/// 主语言中可索引、非密码且带发布时间的章节，新的在前
fn feed_items<'a>(site: &SiteConfig, novels: impl Iterator<Item = &'a NovelEntry>) -> Vec<FeedItem> {
    let mut items = Vec::new();
    for novel in novels {
        let novel_allows = novel.allows_indexing(site.allows_indexing());
        let Some(edition) = novel.primary_edition() else {
            continue;
        };
        for chapter in edition.chapters.iter().filter(|c| c.indexable(novel_allows)) {
            let Some(published) = chapter.published_at() else {
                continue;
            };
            items.push(FeedItem {
                title: format!("{} - {}", chapter.title, novel.config.display_title()),
                link: format!("{}/{}/{}/{}/", site.base_url(), novel.slug(), edition.language, chapter.id),
                description: chapter_description(chapter),
                published,
            });
        }
    }
    items.sort_by(|a, b| b.published.cmp(&a.published));
    items
}

fn chapter_description(chapter: &ChapterEntry) -> String {
    chapter
        .meta()
        .extra
        .get("social_embeds")
        .and_then(|s| s.get("description"))
        .and_then(|d| d.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| extract_excerpt(&render_markdown(&chapter.chapter.doc.body), RSS_EXCERPT_CHARS))
}

pub fn rss_xml(title: &str, description: &str, link: &str, self_link: &str, items: &[FeedItem], max_items: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n");
    xml.push_str("  <channel>\n");
    xml.push_str(&format!("    <title>{}</title>\n", xml_escape(title)));
    xml.push_str(&format!("    <link>{}</link>\n", xml_escape(link)));
    xml.push_str(&format!("    <description>{}</description>\n", xml_escape(description)));
    xml.push_str(&format!(
        "    <atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\" />\n",
        xml_escape(self_link)
    ));

    for item in items.iter().take(max_items) {
        xml.push_str("    <item>\n");
        xml.push_str(&format!("      <title>{}</title>\n", xml_escape(&item.title)));
        xml.push_str(&format!("      <link>{}</link>\n", xml_escape(&item.link)));
        xml.push_str(&format!(
            "      <guid isPermaLink=\"true\">{}</guid>\n",
            xml_escape(&item.link)
        ));
        xml.push_str(&format!(
            "      <pubDate>{}</pubDate>\n",
            item.published.format("%a, %d %b %Y %H:%M:%S +0000")
        ));
        xml.push_str(&format!("      <description>{}</description>\n", xml_escape(&item.description)));
        xml.push_str("    </item>\n");
    }

    xml.push_str("  </channel>\n</rss>\n");
    xml
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::test_helpers::{ProjectBuilder, chapter_md};

    fn project() -> crate::test_helpers::TestProject {
        ProjectBuilder::new()
            .novel("n", &["c1", "c2", "c3", "c4"])
            .chapter("n", "c1", &chapter_md("Open", "published: 2024-01-01\n"))
            .chapter("n", "c2", &chapter_md("Locked", "published: 2024-01-02\npassword: pw\n"))
            .chapter("n", "c3", &chapter_md("Quiet", "published: 2024-01-03\nseo:\n  allow_indexing: false\n"))
            .chapter("n", "c4", &chapter_md("Draft", "published: 2024-01-04\ndraft: true\n"))
            .build()
    }

    #[test]
    fn robots_blocks_protected_and_noindex_chapters() {
        let project = project();
        let ctx = project.context(BuildFlags::default());
        let catalog = Catalog::load(&ctx);
        let robots = robots_txt(&ctx.settings.site, &catalog);
        assert!(robots.contains("Sitemap: https://example.com/sitemap.xml"));
        assert!(robots.contains("Disallow: /n/en/c2/"));
        assert!(robots.contains("Disallow: /n/en/c3/"));
        assert!(!robots.contains("/n/en/c1/"));
        // 草稿不可见，不出现在任何地方
        assert!(!robots.contains("c4"));
    }

    #[test]
    fn site_wide_noindex_disallows_everything() {
        let project = ProjectBuilder::new()
            .site_config("site_name: S\nseo:\n  allow_indexing: false\n")
            .build();
        let ctx = project.context(BuildFlags::default());
        let robots = robots_txt(&ctx.settings.site, &Catalog::default());
        assert!(robots.contains("Disallow: /\n"));
        assert!(!robots.contains("Sitemap:"));
    }

    #[test]
    fn sitemap_and_rss_list_only_indexable_chapters() {
        let project = project();
        let ctx = project.context(BuildFlags::default());
        let catalog = Catalog::load(&ctx);
        finalize(&ctx, &catalog).unwrap();

        let sitemap = project.read_output("sitemap.xml");
        assert!(sitemap.contains("https://example.com/n/en/toc/"));
        assert!(sitemap.contains("https://example.com/n/en/c1/"));
        assert!(!sitemap.contains("/n/en/c2/"));
        assert!(!sitemap.contains("/n/en/c3/"));
        assert!(!sitemap.contains("/n/en/c4/"));

        let rss = project.read_output("rss.xml");
        assert!(rss.contains("https://example.com/n/en/c1/"));
        assert!(!rss.contains("c2") && !rss.contains("c3") && !rss.contains("c4"));
        assert!(project.read_output("n/rss.xml").contains("Open"));
    }

    #[test]
    fn sitemap_without_site_url_is_empty() {
        let project = ProjectBuilder::new().site_config("site_name: S\n").build();
        let ctx = project.context(BuildFlags::default());
        let xml = sitemap_xml(&ctx, &Catalog::default());
        assert!(!xml.contains("<url>"));
    }
}
