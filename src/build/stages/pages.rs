use crate::build::context::BuildContext;
use crate::build::error::BuildResult;
use crate::build::meta::{self, PageChrome, PageKind};
use crate::content::markdown::render_markdown;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

const TOP_LEVEL_CATEGORY: &str = "主要页面";

#[derive(Debug, Clone, Serialize)]
pub struct Breadcrumb {
    pub title: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct PageInfo {
    title: String,
    description: String,
    url: String,
    slug: String,
    is_password_protected: bool,
    languages: Vec<String>,
}

/// 页面输出深度：slug 的每一段加上语言目录
pub fn page_depth(slug: &str) -> usize {
    slug.split('/').count() + 1
}

/// 首页 → 各级父目录 → 当前页面（无链接）
pub fn breadcrumbs(slug: &str, language: &str, title: &str) -> Vec<Breadcrumb> {
    let root = crate::project::relative_root(page_depth(slug));
    let mut crumbs = vec![Breadcrumb {
        title: "首页".to_string(),
        url: Some(root.clone()),
    }];
    let parts: Vec<&str> = slug.split('/').collect();
    for i in 0..parts.len().saturating_sub(1) {
        crumbs.push(Breadcrumb {
            title: title_case(parts[i]),
            url: Some(format!("{root}{}/{language}/", parts[..=i].join("/"))),
        });
    }
    crumbs.push(Breadcrumb {
        title: title.to_string(),
        url: None,
    });
    crumbs
}

fn title_case(part: &str) -> String {
    part.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// 渲染所有页面的所有语言版本，以及页面索引；返回写出的页面数
pub fn render_all(ctx: &mut BuildContext) -> BuildResult<usize> {
    let slugs = ctx.loader().list_pages();
    let mut count = 0;
    for slug in &slugs {
        let site = &ctx.settings.site;
        let languages = ctx
            .loader()
            .page_languages(slug, &site.available_languages(), site.default_language());
        for language in languages {
            match render_page(ctx, slug, &language) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) if e.is_skippable() => tracing::warn!("跳过页面 {slug}（{language}）：{e}"),
                Err(e) => return Err(e),
            }
        }
    }
    count += render_page_index(ctx)?;
    if count > 0 {
        tracing::info!("已生成 {count} 个页面");
    }
    Ok(count)
}

/// 渲染单个页面；隐藏页面与未开启草稿时的草稿页面跳过并返回 false
pub fn render_page(ctx: &mut BuildContext, slug: &str, language: &str) -> BuildResult<bool> {
    let site = ctx.settings.site.clone();
    let page = ctx.loader().load_page(slug, language, site.default_language())?;
    if !ctx.rules().page_visible(&page.meta) {
        tracing::info!("跳过草稿或隐藏页面：{slug}（{language}）");
        return Ok(false);
    }

    let title = page.meta.title.clone().unwrap_or_else(|| title_case(slug));
    let depth = page_depth(slug);
    let path = format!("{slug}/{language}/");
    let html = render_markdown(&page.doc.body);
    let protected = page
        .meta
        .password
        .as_deref()
        .filter(|_| page.meta.has_password())
        .map(|pw| meta::protect(&html, pw, page.meta.password_hint.as_deref()));

    let page_languages = ctx
        .loader()
        .page_languages(slug, &site.available_languages(), site.default_language());
    let language_urls: BTreeMap<&str, String> = page_languages
        .iter()
        .map(|lang| (lang.as_str(), format!("../{lang}/")))
        .collect();

    let base = meta::page_vars(
        ctx,
        depth,
        language,
        PageChrome {
            kind: PageKind::Page,
            novel: None,
            overrides: Some(&page.doc.front_matter),
            seo: Some(&page.meta.seo),
            title: &title,
            path: &path,
        },
    );
    let vars = meta::with_vars(
        base,
        json!({
            "page": meta::public_meta(&page.meta),
            "content": if protected.is_some() { String::new() } else { html },
            "protected": protected,
            "breadcrumbs": breadcrumbs(slug, language, &title),
            "available_languages": page_languages,
            "language_urls": language_urls,
        }),
    );
    let output = ctx.render(None, "page.html", &vars)?;
    ctx.write_html(&format!("{path}index.html"), output)?;
    tracing::debug!("已生成页面：{slug}（{language}）");
    Ok(true)
}

/// 每种站点语言一份页面索引；默认语言位于 pages/，其余位于 pages/<lang>/
pub fn render_page_index(ctx: &mut BuildContext) -> BuildResult<usize> {
    let slugs = ctx.loader().list_pages();
    if slugs.is_empty() {
        return Ok(0);
    }
    let site = ctx.settings.site.clone();
    let rules = ctx.rules();
    let mut written = 0;

    for language in site.available_languages() {
        let mut categories: BTreeMap<String, Vec<PageInfo>> = BTreeMap::new();
        for slug in &slugs {
            let Ok(page) = ctx.loader().load_page(slug, &language, site.default_language()) else {
                continue;
            };
            if !rules.page_visible(&page.meta) {
                continue;
            }
            let languages =
                ctx.loader()
                    .page_languages(slug, &site.available_languages(), site.default_language());
            let target = if languages.contains(&language) {
                language.as_str()
            } else {
                site.default_language()
            };
            let category = match slug.split_once('/') {
                Some((parent, _)) => title_case(parent),
                None => TOP_LEVEL_CATEGORY.to_string(),
            };
            categories.entry(category).or_default().push(PageInfo {
                title: page.meta.title.clone().unwrap_or_else(|| title_case(slug)),
                description: page.meta.description.clone().unwrap_or_default(),
                url: format!("{slug}/{target}/"),
                slug: slug.clone(),
                is_password_protected: page.meta.has_password(),
                languages,
            });
        }
        for pages in categories.values_mut() {
            pages.sort_by(|a, b| a.title.cmp(&b.title));
        }

        let (path, depth) = if language == site.default_language() {
            ("pages/".to_string(), 1)
        } else {
            (format!("pages/{language}/"), 2)
        };
        let title = format!("全部页面 | {}", site.site_name);
        let base = meta::page_vars(
            ctx,
            depth,
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
        let vars = meta::with_vars(base, json!({ "page_categories": categories }));
        let output = ctx.render(None, "page_index.html", &vars)?;
        ctx.write_html(&format!("{path}index.html"), output)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::test_helpers::ProjectBuilder;

    #[test]
    fn nested_breadcrumbs() {
        let crumbs = breadcrumbs("resources/guide", "en", "Guide");
        assert_eq!(crumbs.len(), 3);
        assert_eq!(crumbs[0].url.as_deref(), Some("../../../"));
        assert_eq!(crumbs[1].title, "Resources");
        assert_eq!(crumbs[1].url.as_deref(), Some("../../../resources/en/"));
        assert!(crumbs[2].url.is_none());
    }

    #[test]
    fn renders_pages_and_skips_drafts() {
        let project = ProjectBuilder::new()
            .file("pages/about.md", "---\ntitle: About Us\nnavigation: header\n---\nHello **there**")
            .file("pages/secret.md", "---\ntitle: Secret\ndraft: true\n---\nhidden")
            .file("pages/resources/guide.md", "---\ntitle: Guide\n---\nGuide body")
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let count = render_all(&mut ctx).unwrap();
        assert_eq!(count, 3);

        let about = project.read_output("about/en/index.html");
        assert!(about.contains("<strong>there</strong>"));
        assert!(project.build_path("resources/guide/en/index.html").is_file());
        assert!(!project.build_path("secret/en/index.html").exists());

        let index = project.read_output("pages/index.html");
        assert!(index.contains("About Us"));
        assert!(!index.contains("Secret"));
    }

    #[test]
    fn password_page_hides_body() {
        let project = ProjectBuilder::new()
            .file("pages/vip.md", "---\ntitle: VIP\npassword: pw\n---\nTop secret words")
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        assert!(render_page(&mut ctx, "vip", "en").unwrap());
        let html = project.read_output("vip/en/index.html");
        assert!(!html.contains("Top secret words"));
        assert!(html.contains("data-encrypted"));
    }
}
