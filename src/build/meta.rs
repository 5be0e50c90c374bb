//! 所有页面共享的模板变量：社交卡片、SEO、页脚、评论、导航与密码占位

use crate::build::context::BuildContext;
use crate::config::{SeoConfig, SiteConfig};
use crate::content::novel::NovelConfig;
use crate::project::relative_root;
use chrono::Datelike;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Site,
    Page,
    Toc,
    Chapter,
}

#[derive(Debug, Clone, Serialize)]
pub struct SocialMeta {
    pub title: String,
    pub description: String,
    pub image: String,
    pub url: String,
    pub keywords: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeoMeta {
    pub allow_indexing: bool,
    pub meta_description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FooterData {
    pub copyright: String,
    pub links: Vec<Value>,
    pub additional_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentsConfig {
    pub enabled: bool,
    pub repo: String,
    pub issue_term: String,
    pub label: String,
    pub theme: String,
}

/// 导航条目；`path` 相对站点根目录，模板中与 `root` 拼接
#[derive(Debug, Clone, Serialize)]
pub struct NavItem {
    pub title: String,
    pub path: String,
    pub slug: String,
    pub order: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NavMenus {
    pub header: Vec<NavItem>,
    pub footer: Vec<NavItem>,
}

/// 密码章节的占位数据
#[derive(Debug, Clone, Serialize)]
pub struct Protected {
    pub encrypted_content: String,
    pub password_hash: String,
    pub password_hint: String,
}

fn lookup<'a>(map: &'a Map<String, Value>, section: &str, key: &str) -> Option<&'a Value> {
    map.get(section).and_then(|s| s.get(key))
}

fn lookup_str<'a>(map: &'a Map<String, Value>, section: &str, key: &str) -> Option<&'a str> {
    lookup(map, section, key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// 社交卡片：章节/页面 Front Matter → 小说配置 → 站点配置
pub fn social_meta(
    site: &SiteConfig,
    novel: Option<&NovelConfig>,
    overrides: Option<&Map<String, Value>>,
    kind: PageKind,
    title: &str,
    url: String,
) -> SocialMeta {
    let empty = Map::new();
    let own = overrides.unwrap_or(&empty);
    let novel_extra = novel.map(|n| &n.extra).unwrap_or(&empty);
    let novel_title = novel.map(|n| n.display_title()).unwrap_or_default();

    let base_title = match (lookup_str(own, "social_embeds", "title"), kind) {
        (Some(t), _) => t.to_string(),
        (None, PageKind::Chapter) if !novel_title.is_empty() => format!("{title} - {novel_title}"),
        (None, PageKind::Toc) => format!("{novel_title} - 目录"),
        _ => title.to_string(),
    };
    let title = match lookup_str(&site.extra, "social_embeds", "title_format") {
        Some(format) => format.replace("{title}", &base_title),
        None => base_title,
    };

    let description = lookup_str(own, "social_embeds", "description")
        .or_else(|| lookup_str(novel_extra, "social_embeds", "description"))
        .or_else(|| lookup_str(&site.extra, "social_embeds", "default_description"))
        .unwrap_or(&site.site_description)
        .to_string();

    let image = lookup_str(own, "social_embeds", "image")
        .or_else(|| lookup_str(novel_extra, "social_embeds", "image"))
        .or_else(|| lookup_str(&site.extra, "social_embeds", "default_image"))
        .unwrap_or("/static/images/default-social.jpg");
    let image = if image.starts_with('/') {
        format!("{}{image}", site.base_url())
    } else {
        image.to_string()
    };

    let keywords = lookup(own, "social_embeds", "keywords")
        .or_else(|| lookup(novel_extra, "social_embeds", "keywords"))
        .and_then(Value::as_array)
        .map(|words| {
            words
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty());

    SocialMeta {
        title,
        description,
        image,
        url,
        keywords,
    }
}

/// 索引开关与描述：章节 → 小说 → 站点
pub fn seo_meta(site: &SiteConfig, novel: Option<&NovelConfig>, own: Option<&SeoConfig>) -> SeoMeta {
    let allow_indexing = own
        .and_then(|s| s.allow_indexing)
        .or_else(|| novel.and_then(|n| n.seo.allow_indexing))
        .unwrap_or_else(|| site.allows_indexing());
    let meta_description = own
        .and_then(|s| s.meta_description.clone())
        .or_else(|| novel.and_then(|n| n.seo.meta_description.clone()))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| site.site_description.clone());
    SeoMeta {
        allow_indexing,
        meta_description,
    }
}

pub fn footer(site: &SiteConfig, novel: Option<&NovelConfig>, year: i32) -> FooterData {
    let empty = Map::new();
    let novel_extra = novel.map(|n| &n.extra).unwrap_or(&empty);

    let copyright = lookup_str(novel_extra, "footer", "custom_text")
        .or_else(|| novel_extra.get("copyright").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("© {year} {}", site.site_name));

    let mut links = Vec::new();
    for source in [novel_extra, &site.extra] {
        if let Some(list) = lookup(source, "footer", "links").and_then(Value::as_array) {
            links.extend(list.iter().cloned());
        }
    }

    FooterData {
        copyright,
        links,
        additional_text: lookup_str(&site.extra, "footer", "additional_text").map(str::to_string),
    }
}

/// 评论开关：Front Matter → 小说（按页面类型）→ 站点；评论后端只把配置交给模板
pub fn comments(
    site: &SiteConfig,
    novel: Option<&NovelConfig>,
    overrides: Option<&Map<String, Value>>,
    kind: PageKind,
) -> CommentsConfig {
    let own = overrides.and_then(|o| o.get("comments")).and_then(|c| match c {
        Value::Bool(b) => Some(*b),
        Value::Object(map) => map.get("enabled").and_then(Value::as_bool),
        _ => None,
    });
    let novel_setting = novel.and_then(|n| {
        let key = match kind {
            PageKind::Chapter => "chapter_comments",
            PageKind::Toc => "toc_comments",
            _ => "enabled",
        };
        n.comments
            .get(key)
            .and_then(Value::as_bool)
            .or_else(|| n.comments.get("enabled").and_then(Value::as_bool))
    });
    let site_setting = lookup(&site.extra, "comments", "enabled").and_then(Value::as_bool);

    let get = |key: &str, default: &str| {
        lookup_str(&site.extra, "comments", key)
            .unwrap_or(default)
            .to_string()
    };
    CommentsConfig {
        enabled: own.or(novel_setting).or(site_setting).unwrap_or(false),
        repo: get("utterances_repo", ""),
        issue_term: get("utterances_issue_term", "pathname"),
        label: get("utterances_label", "comment"),
        theme: get("utterances_theme", "github-light"),
    }
}

/// 页面导航：Front Matter `navigation: header|footer` 的可见页面，按 nav_order 排序
pub fn navigation(ctx: &BuildContext, language: &str) -> NavMenus {
    let loader = ctx.loader();
    let rules = ctx.rules();
    let site = &ctx.settings.site;
    let mut menus = NavMenus::default();
    for slug in loader.list_pages() {
        let languages = loader.page_languages(&slug, &site.available_languages(), site.default_language());
        if !languages.iter().any(|l| l == language) {
            continue;
        }
        let Ok(page) = loader.load_page(&slug, language, site.default_language()) else {
            continue;
        };
        if !rules.page_visible(&page.meta) {
            continue;
        }
        let item = NavItem {
            title: page.meta.title.clone().unwrap_or_else(|| slug.clone()),
            path: format!("{slug}/{language}/"),
            slug: slug.clone(),
            order: page.meta.nav_order.unwrap_or(999),
        };
        match page.meta.navigation.as_deref() {
            Some("header") => menus.header.push(item),
            Some("footer") => menus.footer.push(item),
            _ => {}
        }
    }
    menus.header.sort_by_key(|i| i.order);
    menus.footer.sort_by_key(|i| i.order);
    menus
}

/// 把渲染好的 HTML 与密码的 SHA-256 摘要逐字节异或后十六进制编码
///
/// 只是客户端解锁用的占位方案，不提供安全性。
pub fn protect(html: &str, password: &str, hint: Option<&str>) -> Protected {
    let key = Sha256::digest(password.as_bytes());
    let encrypted_content = html
        .as_bytes()
        .iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| format!("{:02x}", b ^ k))
        .collect();
    let digest = format!("{:x}", Sha256::digest(password.as_bytes()));
    Protected {
        encrypted_content,
        password_hash: digest[..16].to_string(),
        password_hint: hint.unwrap_or("本章节受密码保护。").to_string(),
    }
}

/// 交给模板的 Front Matter 视图，去掉明文密码
pub fn public_meta<T: Serialize>(meta: &T) -> Value {
    let mut value = serde_json::to_value(meta).unwrap_or_default();
    if let Some(map) = value.as_object_mut() {
        map.remove("password");
    }
    value
}

/// 每个模板都能用到的变量
pub fn base_vars(ctx: &BuildContext, depth: usize, language: &str) -> Map<String, Value> {
    let site = &ctx.settings.site;
    let mut vars = Map::new();
    vars.insert("site".into(), serde_json::to_value(site).unwrap_or_default());
    vars.insert("site_name".into(), site.site_name.clone().into());
    vars.insert("site_url".into(), site.base_url().into());
    vars.insert("root".into(), relative_root(depth).into());
    vars.insert("build_time".into(), ctx.now.to_rfc3339().into());
    vars.insert("current_language".into(), language.into());
    vars.insert("webring".into(), ctx.settings.webring.clone());
    vars.insert(
        "twitter_handle".into(),
        lookup(&site.extra, "social_embeds", "twitter_handle")
            .cloned()
            .unwrap_or(Value::Null),
    );
    vars
}

/// 一个页面的外围信息：用于社交卡片、SEO、评论与导航
pub struct PageChrome<'a> {
    pub kind: PageKind,
    pub novel: Option<&'a NovelConfig>,
    /// 页面自身的 Front Matter
    pub overrides: Option<&'a Map<String, Value>>,
    pub seo: Option<&'a SeoConfig>,
    pub title: &'a str,
    /// 相对站点根目录的路径，例如 `my-novel/en/toc/`
    pub path: &'a str,
}

/// 基础变量加上社交卡片、SEO、页脚、评论与导航
pub fn page_vars(ctx: &BuildContext, depth: usize, language: &str, chrome: PageChrome<'_>) -> Map<String, Value> {
    let site = &ctx.settings.site;
    let url = format!("{}/{}", site.base_url(), chrome.path);
    let social = social_meta(site, chrome.novel, chrome.overrides, chrome.kind, chrome.title, url);
    let seo = seo_meta(site, chrome.novel, chrome.seo);
    let footer = footer(site, chrome.novel, ctx.now.year());
    let comments = comments(site, chrome.novel, chrome.overrides, chrome.kind);
    let navigation = navigation(ctx, language);

    let mut vars = base_vars(ctx, depth, language);
    vars.insert("page_title".into(), chrome.title.into());
    vars.insert("page_path".into(), chrome.path.into());
    for (key, value) in [
        ("social", serde_json::to_value(social)),
        ("seo", serde_json::to_value(seo)),
        ("footer", serde_json::to_value(footer)),
        ("comments", serde_json::to_value(comments)),
        ("navigation", serde_json::to_value(navigation)),
    ] {
        vars.insert(key.into(), value.unwrap_or_default());
    }
    vars
}

/// 合并额外变量（对象键覆盖基础变量）
pub fn with_vars(mut base: Map<String, Value>, extra: Value) -> Value {
    if let Value::Object(extra) = extra {
        base.extend(extra);
    }
    Value::Object(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteConfig {
        crate::yaml::from_str(
            "site_name: Test\nsite_url: https://example.com/\nsite_description: Desc\n\
             social_embeds:\n  default_image: /img/social.png\n  title_format: '{title} | Test'\n\
             comments:\n  enabled: false\n  utterances_repo: me/repo\n",
        )
        .unwrap()
    }

    fn novel() -> NovelConfig {
        let mut novel: NovelConfig = crate::yaml::from_str(
            "title: Story\nseo:\n  allow_indexing: false\ncomments:\n  chapter_comments: true\n\
             social_embeds:\n  description: Story desc\n  keywords: [magic, school]\n",
        )
        .unwrap();
        novel.slug = "story".into();
        novel
    }

    #[test]
    fn social_meta_cascades() {
        let meta = social_meta(
            &site(),
            Some(&novel()),
            None,
            PageKind::Chapter,
            "Chapter 1",
            "https://example.com/story/en/c1/".into(),
        );
        assert_eq!(meta.title, "Chapter 1 - Story | Test");
        assert_eq!(meta.description, "Story desc");
        assert_eq!(meta.image, "https://example.com/img/social.png");
        assert_eq!(meta.keywords.as_deref(), Some("magic, school"));

        let own: Map<String, Value> =
            serde_json::from_str(r#"{"social_embeds":{"title":"Custom","image":"http://x/y.png"}}"#).unwrap();
        let meta = social_meta(&site(), Some(&novel()), Some(&own), PageKind::Chapter, "C", String::new());
        assert_eq!(meta.title, "Custom | Test");
        assert_eq!(meta.image, "http://x/y.png");
    }

    #[test]
    fn seo_chapter_overrides_novel() {
        let novel = novel();
        assert!(!seo_meta(&site(), Some(&novel), None).allow_indexing);
        let own = SeoConfig {
            allow_indexing: Some(true),
            meta_description: None,
        };
        let seo = seo_meta(&site(), Some(&novel), Some(&own));
        assert!(seo.allow_indexing);
        assert_eq!(seo.meta_description, "Desc");
    }

    #[test]
    fn comments_follow_page_kind() {
        let novel = novel();
        assert!(comments(&site(), Some(&novel), None, PageKind::Chapter).enabled);
        assert!(!comments(&site(), Some(&novel), None, PageKind::Toc).enabled);
        let own: Map<String, Value> = serde_json::from_str(r#"{"comments":false}"#).unwrap();
        let c = comments(&site(), Some(&novel), Some(&own), PageKind::Chapter);
        assert!(!c.enabled);
        assert_eq!(c.repo, "me/repo");
    }

    #[test]
    fn footer_defaults_to_site_name() {
        let f = footer(&site(), None, 2024);
        assert_eq!(f.copyright, "© 2024 Test");
        assert!(f.links.is_empty());
    }

    #[test]
    fn protected_payload_is_hex_xor() {
        let p = protect("hi", "secret", None);
        let key = Sha256::digest(b"secret");
        assert_eq!(p.encrypted_content, format!("{:02x}{:02x}", b'h' ^ key[0], b'i' ^ key[1]));
        assert_eq!(p.password_hash.len(), 16);
        assert!(format!("{key:x}").starts_with(&p.password_hash));
    }

    #[test]
    fn public_meta_drops_password() {
        let meta = crate::content::ChapterMeta {
            title: Some("T".into()),
            password: Some("pw".into()),
            ..Default::default()
        };
        let value = public_meta(&meta);
        assert_eq!(value["title"], "T");
        assert!(value.get("password").is_none());
    }
}
