//! 把单个变更文件路径映射为重建范围
//!
//! 纯函数：只看路径字符串，不读文件系统，也不依赖之前的状态。

use crate::project::{
    CHAPTERS_DIR, CONTENT_DIR, MARKDOWN_EXT, NOVEL_CONFIG_FILE, PAGES_DIR, SITE_CONFIG_ALT_FILE,
    SITE_CONFIG_FILE, STATIC_DIR, TEMPLATE_EXT, TEMPLATES_DIR, is_language_code,
};
use std::fmt;

/// 全量重建的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullReason {
    SiteConfig,
    GlobalTemplate,
    Unrecognized,
    NovelConfig(String),
    NovelTemplate(String),
    /// 章节不在任何卷中，目录与导航需要整体重算
    UnlistedChapter { novel_slug: String, chapter_id: String },
    /// 窄范围重建失败后的回退
    Escalated(String),
}

impl fmt::Display for FullReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SiteConfig => write!(f, "站点配置变更"),
            Self::GlobalTemplate => write!(f, "全局模板变更"),
            Self::Unrecognized => write!(f, "无法识别的文件类型"),
            Self::NovelConfig(slug) => write!(f, "小说 {slug} 配置变更"),
            Self::NovelTemplate(slug) => write!(f, "小说 {slug} 模板变更"),
            Self::UnlistedChapter {
                novel_slug,
                chapter_id,
            } => write!(f, "章节 {novel_slug}/{chapter_id} 不在任何卷中"),
            Self::Escalated(error) => write!(f, "增量重建失败：{error}"),
        }
    }
}

/// 一次文件变更对应的重建范围
///
/// `language` 为 `None` 表示路径中没有语言目录：章节取小说主语言，页面取站点默认语言，
/// 由执行器读取配置后决定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildScope {
    Full {
        reason: FullReason,
    },
    /// `path` 相对 static/ 目录
    StaticAsset {
        path: String,
    },
    Page {
        slug: String,
        language: Option<String>,
    },
    Chapter {
        novel_slug: String,
        chapter_id: String,
        language: Option<String>,
    },
    NovelConfig {
        novel_slug: String,
    },
    NovelTemplate {
        novel_slug: String,
        template_name: String,
    },
}

impl RebuildScope {
    pub fn full(reason: FullReason) -> Self {
        Self::Full { reason }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }
}

impl fmt::Display for RebuildScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full { reason } => write!(f, "全量重建（{reason}）"),
            Self::StaticAsset { path } => write!(f, "静态资源 {path}"),
            Self::Page { slug, language } => {
                write!(f, "页面 {slug}")?;
                if let Some(lang) = language {
                    write!(f, "（{lang}）")?;
                }
                Ok(())
            }
            Self::Chapter {
                novel_slug,
                chapter_id,
                language,
            } => {
                write!(f, "章节 {novel_slug}/{chapter_id}")?;
                if let Some(lang) = language {
                    write!(f, "（{lang}）")?;
                }
                Ok(())
            }
            Self::NovelConfig { novel_slug } => write!(f, "小说配置 {novel_slug}"),
            Self::NovelTemplate {
                novel_slug,
                template_name,
            } => write!(f, "小说模板 {novel_slug}/{template_name}"),
        }
    }
}

/// 统一分隔符并拆成路径段，忽略空段与 `.`
fn segments(path: &str) -> Vec<&str> {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

fn has_ext(name: &str, ext: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(stem, e)| !stem.is_empty() && e.eq_ignore_ascii_case(ext))
}

fn strip_ext<'a>(name: &'a str, ext: &str) -> &'a str {
    name.len()
        .checked_sub(ext.len() + 1)
        .map(|end| &name[..end])
        .unwrap_or(name)
}

/// 从右向左找锚点目录，返回第一个让 `matcher` 成功的结果
fn find_anchored<T>(segs: &[&str], anchor: &str, matcher: impl Fn(&[&str]) -> Option<T>) -> Option<T> {
    (0..segs.len())
        .rev()
        .filter(|&i| segs[i] == anchor)
        .find_map(|i| matcher(&segs[i + 1..]))
}

/// 变更文件 → 重建范围，按优先级逐条匹配
pub fn classify(changed_path: &str) -> RebuildScope {
    let segs = segments(changed_path);
    let Some(&file_name) = segs.last() else {
        return RebuildScope::full(FullReason::Unrecognized);
    };

    if file_name == SITE_CONFIG_FILE || file_name == SITE_CONFIG_ALT_FILE {
        return RebuildScope::full(FullReason::SiteConfig);
    }

    if has_ext(file_name, TEMPLATE_EXT) && is_global_template(&segs) {
        return RebuildScope::full(FullReason::GlobalTemplate);
    }

    if let Some(scope) = find_anchored(&segs, CONTENT_DIR, match_novel_template) {
        return scope;
    }

    if let Some(scope) = find_anchored(&segs, STATIC_DIR, |rest| {
        (!rest.is_empty()).then(|| RebuildScope::StaticAsset {
            path: rest.join("/"),
        })
    }) {
        return scope;
    }

    if let Some(scope) = find_anchored(&segs, CONTENT_DIR, match_novel_config) {
        return scope;
    }

    if let Some(scope) = find_anchored(&segs, CONTENT_DIR, match_chapter) {
        return scope;
    }

    if let Some(scope) = find_anchored(&segs, PAGES_DIR, match_page) {
        return scope;
    }

    RebuildScope::full(FullReason::Unrecognized)
}

/// templates/ 之下，且不是 content/<slug>/templates/
fn is_global_template(segs: &[&str]) -> bool {
    let last = segs.len() - 1;
    (0..last).any(|i| {
        segs[i] == TEMPLATES_DIR && !(i >= 2 && segs[i - 2] == CONTENT_DIR)
    })
}

// 以下匹配函数的参数都是锚点目录之后的路径段

fn match_novel_template(rest: &[&str]) -> Option<RebuildScope> {
    match rest {
        [slug, dir, name @ ..] if *dir == TEMPLATES_DIR && !name.is_empty() => {
            let template_name = name.join("/");
            has_ext(&template_name, TEMPLATE_EXT).then(|| RebuildScope::NovelTemplate {
                novel_slug: slug.to_string(),
                template_name,
            })
        }
        _ => None,
    }
}

fn match_novel_config(rest: &[&str]) -> Option<RebuildScope> {
    match rest {
        [slug, file] if *file == NOVEL_CONFIG_FILE => Some(RebuildScope::NovelConfig {
            novel_slug: slug.to_string(),
        }),
        _ => None,
    }
}

fn match_chapter(rest: &[&str]) -> Option<RebuildScope> {
    let (slug, language, file) = match rest {
        [slug, dir, file] if *dir == CHAPTERS_DIR => (slug, None, file),
        [slug, dir, lang, file] if *dir == CHAPTERS_DIR && is_language_code(lang) => {
            (slug, Some(lang.to_string()), file)
        }
        _ => return None,
    };
    has_ext(file, MARKDOWN_EXT).then(|| RebuildScope::Chapter {
        novel_slug: slug.to_string(),
        chapter_id: strip_ext(file, MARKDOWN_EXT).to_string(),
        language,
    })
}

fn match_page(rest: &[&str]) -> Option<RebuildScope> {
    let file = rest.last()?;
    if !has_ext(file, MARKDOWN_EXT) {
        return None;
    }
    // 两位字母目录后面还有路径段时才视为语言前缀
    let (language, parts) = match rest {
        [lang, tail @ ..] if !tail.is_empty() && is_language_code(lang) => (Some(lang.to_string()), tail),
        _ => (None, rest),
    };
    let mut slug_parts: Vec<&str> = parts.to_vec();
    if let Some(last) = slug_parts.last_mut() {
        let name: &str = *last;
        *last = strip_ext(name, MARKDOWN_EXT);
    }
    Some(RebuildScope::Page {
        slug: slug_parts.join("/"),
        language,
    })
}
