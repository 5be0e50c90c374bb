//! 小说目录与章节页面

use crate::build::catalog::{ChapterEntry, Edition, NovelEntry};
use crate::build::context::{BuildContext, write_file};
use crate::build::error::{BuildError, BuildResult, IoContext};
use crate::build::meta::{self, PageChrome, PageKind};
use crate::build::stages::assets::CoverArt;
use crate::build::stages::{epub, extras};
use crate::content::ChapterMeta;
use crate::content::markdown::{
    count_words, extract_local_images, render_markdown, rewrite_local_images,
};
use crate::content::novel::NovelConfig;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 目录与章节页都位于 `<novel>/<lang>/<x>/`
const NOVEL_PAGE_DEPTH: usize = 3;

const MANGA_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
const DEFAULT_PAGE_ALT: &str = "{story_title} Chapter {chapter_number}, Page {page}";
const MAX_RELATED: usize = 5;

#[derive(Debug, Clone, Serialize)]
struct TocChapter {
    id: String,
    title: String,
    url: String,
    published: Option<String>,
    tags: Vec<String>,
    translation_missing: bool,
    has_password: bool,
}

#[derive(Debug, Clone, Serialize)]
struct TocArc {
    index: usize,
    title: String,
    description: String,
    cover_art: Option<String>,
    chapters: Vec<TocChapter>,
}

#[derive(Debug, Clone, Serialize)]
struct ArcDownload {
    title: String,
    epub: String,
}

#[derive(Debug, Clone, Default, Serialize)]
struct DownloadLinks {
    story_epub: Option<String>,
    arcs: Vec<ArcDownload>,
}

#[derive(Debug, Clone, Serialize)]
struct StoryLength {
    count: usize,
    unit: String,
    avg_per_chapter: usize,
    total_chapters: usize,
}

#[derive(Debug, Clone, Serialize)]
struct ChapterLink {
    id: String,
    title: String,
    url: String,
}

impl From<&ChapterEntry> for ChapterLink {
    fn from(entry: &ChapterEntry) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            url: format!("../{}/", entry.id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct MangaPage {
    number: usize,
    filename: String,
    path: String,
    alt_text: String,
}

#[derive(Debug, Clone, Serialize)]
struct MangaData {
    pages: Vec<MangaPage>,
    page_count: usize,
    reading_direction: String,
}

/// 渲染一部小说全部语言的目录与章节，返回写出的页面数
pub fn render_novel(
    ctx: &mut BuildContext,
    novel: &NovelEntry,
    covers: &HashMap<String, CoverArt>,
) -> BuildResult<usize> {
    let mut count = 0;
    for edition in &novel.editions {
        render_toc(ctx, novel, edition, covers)?;
        count += 1;
        for chapter in &edition.chapters {
            match render_chapter(ctx, &novel.config, edition, &chapter.id) {
                Ok(()) => count += 1,
                Err(e) if e.is_skippable() => {
                    tracing::warn!("跳过章节 {}/{}：{e}", novel.slug(), chapter.id)
                }
                Err(e) => return Err(e),
            }
        }
    }
    tracing::info!("小说 {} 已生成 {count} 个页面", novel.slug());
    Ok(count)
}

/// 目录页：只列出可见章节，下载链接以构建目录中已存在的 EPUB 为准
pub fn render_toc(
    ctx: &mut BuildContext,
    novel: &NovelEntry,
    edition: &Edition,
    covers: &HashMap<String, CoverArt>,
) -> BuildResult<()> {
    let config = &novel.config;
    let language = edition.language.as_str();
    let cover = covers.get(novel.slug());

    let arcs: Vec<TocArc> = config
        .arcs
        .iter()
        .enumerate()
        .filter_map(|(index, arc)| {
            let chapters: Vec<TocChapter> = edition
                .arc_chapters(index)
                .map(|c| TocChapter {
                    id: c.id.clone(),
                    title: c.title.clone(),
                    url: format!("../{}/", c.id),
                    published: c.meta().published.clone(),
                    tags: c.meta().tags().to_vec(),
                    translation_missing: c.chapter.translation_missing,
                    has_password: c.meta().has_password(),
                })
                .collect();
            (!chapters.is_empty()).then(|| TocArc {
                index,
                title: arc.title.clone(),
                description: arc.description.clone(),
                cover_art: cover.and_then(|c| c.arcs.get(&index)).cloned(),
                chapters,
            })
        })
        .collect();

    let downloads = download_links(ctx, config, edition);
    let length = story_length(config, edition);
    let title = config.display_title().to_string();
    let path = format!("{}/{language}/toc/", config.slug);

    let base = meta::page_vars(
        ctx,
        NOVEL_PAGE_DEPTH,
        language,
        PageChrome {
            kind: PageKind::Toc,
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
            "novel_title": title,
            "author_name": config.author_name(),
            "author_username": config.author_username(),
            "arcs": arcs,
            "cover_art": cover.and_then(|c| c.story.clone()),
            "available_languages": novel.languages,
            "download_links": downloads,
            "story_length": length,
            "latest_update": edition.latest_published(ctx.now).map(|d| d.format("%Y-%m-%d").to_string()),
            "glossary_enabled": extras::glossary_file(ctx, config, language).is_some(),
            "characters_enabled": extras::characters_file(ctx, &config.slug).is_some(),
            "all_chapter_ids": edition.chapters.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        }),
    );
    let output = ctx.render(Some(config), "toc.html", &vars)?;
    ctx.write_html(&format!("{path}index.html"), output)
}

fn download_links(ctx: &BuildContext, novel: &NovelConfig, edition: &Edition) -> Option<DownloadLinks> {
    if !novel.downloads.epub_enabled {
        return None;
    }
    let primary = novel.primary_language();
    let exists = |file: &str| ctx.paths.build.join(file).is_file();
    let link = |file: String| format!("{}{file}", crate::project::relative_root(NOVEL_PAGE_DEPTH));

    let mut links = DownloadLinks::default();
    let story = epub::story_file(&novel.slug, &edition.language, primary);
    if exists(&story) {
        links.story_epub = Some(link(story));
    }
    if novel.downloads.include_arcs {
        for (index, arc) in novel.arcs.iter().enumerate() {
            let file = epub::arc_file(&novel.slug, &edition.language, primary, index);
            if edition.arc_chapters(index).next().is_some() && exists(&file) {
                links.arcs.push(ArcDownload {
                    title: arc.title.clone(),
                    epub: link(file),
                });
            }
        }
    }
    (links.story_epub.is_some() || !links.arcs.is_empty()).then_some(links)
}

/// 全文长度：按 `length_display` 配置选择字数或字符数（不含空白）
fn story_length(novel: &NovelConfig, edition: &Edition) -> StoryLength {
    let length_config = novel.extra.get("length_display");
    let unit = length_config
        .and_then(|c| c.get("language_units"))
        .and_then(|units| units.get(&edition.language))
        .or_else(|| length_config.and_then(|c| c.get("default_unit")))
        .and_then(Value::as_str)
        .unwrap_or("words");

    let count: usize = edition
        .chapters
        .iter()
        .map(|c| {
            let body = &c.chapter.doc.body;
            if unit == "characters" {
                body.chars().filter(|ch| !ch.is_whitespace()).count()
            } else {
                count_words(body) as usize
            }
        })
        .sum();
    let total_chapters = edition.chapters.len();
    StoryLength {
        count,
        unit: if unit == "characters" { "characters" } else { "words" }.to_string(),
        avg_per_chapter: if total_chapters > 0 { count / total_chapters } else { 0 },
        total_chapters,
    }
}

fn show_flag(own: Option<bool>, novel_default: bool) -> bool {
    own.unwrap_or(novel_default)
}

/// 章节页；章节必须在当前语言版本的可见清单中
pub fn render_chapter(
    ctx: &mut BuildContext,
    novel: &NovelConfig,
    edition: &Edition,
    chapter_id: &str,
) -> BuildResult<()> {
    let Some(entry) = edition.get(chapter_id) else {
        return Err(BuildError::content(
            ctx.paths.chapters_dir(&novel.slug).join(chapter_id),
            format!("章节 {chapter_id} 不在 {} 的可见章节中", edition.language),
        ));
    };
    let language = edition.language.as_str();
    let chapter = &entry.chapter;
    let chapter_meta = entry.meta();
    let source_dir =
        ctx.paths
            .chapter_source_dir(&novel.slug, &chapter.source_language, novel.primary_language());

    let is_manga = match chapter_meta.kind.as_deref() {
        Some(kind) => kind == "manga",
        None => novel.is_manga(),
    };
    let manga = if is_manga {
        let data = process_manga_pages(ctx, novel, chapter_meta, &source_dir, chapter_id)?;
        if data.pages.is_empty() {
            return Err(BuildError::content(
                source_dir.join(chapter_id),
                "漫画章节没有找到 page* 图片",
            ));
        }
        Some(data)
    } else {
        None
    };

    let body = if is_manga {
        chapter.doc.body.clone()
    } else {
        copy_chapter_images(ctx, &novel.slug, chapter_id, &source_dir, &chapter.doc.body)?
    };
    let html = render_markdown(&body);
    let protected = chapter_meta
        .password
        .as_deref()
        .filter(|_| chapter_meta.has_password())
        .map(|pw| meta::protect(&html, pw, chapter_meta.password_hint.as_deref()));

    let (prev, next) = edition.neighbours(chapter_id);
    let show_tags = !chapter.translation_missing
        && !chapter_meta.hidden
        && show_flag(chapter_meta.show_tags, novel.display.show_tags);
    let show_metadata = show_flag(chapter_meta.show_metadata, novel.display.show_metadata);
    let show_translation_notes = show_flag(
        chapter_meta.show_translation_notes,
        novel.display.show_translation_notes,
    );

    let path = format!("{}/{language}/{chapter_id}/", novel.slug);
    let base = meta::page_vars(
        ctx,
        NOVEL_PAGE_DEPTH,
        language,
        PageChrome {
            kind: PageKind::Chapter,
            novel: Some(novel),
            overrides: Some(&chapter.doc.front_matter),
            seo: Some(&chapter_meta.seo),
            title: &entry.title,
            path: &path,
        },
    );
    let vars = meta::with_vars(
        base,
        json!({
            "novel": novel,
            "novel_slug": novel.slug,
            "novel_title": novel.display_title(),
            "chapter": meta::public_meta(chapter_meta),
            "chapter_id": chapter_id,
            "chapter_title": entry.title,
            "content": if protected.is_some() { String::new() } else { html },
            "protected": protected,
            "translation_missing": chapter.translation_missing,
            "source_language": chapter.source_language,
            "prev_chapter": prev.map(ChapterLink::from),
            "next_chapter": next.map(ChapterLink::from),
            "show_tags": show_tags,
            "show_metadata": show_metadata,
            "show_translation_notes": show_translation_notes,
            "is_manga": is_manga,
            "manga": manga,
            "related_chapters": edition.related(chapter_id, MAX_RELATED),
            "all_chapter_ids": edition.chapters.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            "toc_url": "../toc/",
        }),
    );
    let output = ctx.render(Some(novel), "chapter.html", &vars)?;
    ctx.write_html(&format!("{path}index.html"), output)?;
    tracing::debug!("已生成章节：{}/{language}/{chapter_id}", novel.slug);
    Ok(())
}

fn chapter_images_dir(ctx: &BuildContext, novel_slug: &str, chapter_id: &str) -> PathBuf {
    ctx.paths.build.join("images").join(novel_slug).join(chapter_id)
}

fn chapter_image_url(novel_slug: &str, chapter_id: &str, filename: &str) -> String {
    format!(
        "{}images/{novel_slug}/{chapter_id}/{filename}",
        crate::project::relative_root(NOVEL_PAGE_DEPTH)
    )
}

/// 复制正文引用的本地图片，返回改写引用后的 Markdown；找不到的图片保持原样
fn copy_chapter_images(
    ctx: &BuildContext,
    novel_slug: &str,
    chapter_id: &str,
    source_dir: &Path,
    body: &str,
) -> BuildResult<String> {
    let images = extract_local_images(body);
    if images.is_empty() {
        return Ok(body.to_string());
    }
    let out_dir = chapter_images_dir(ctx, novel_slug, chapter_id);
    let mut rewritten: HashMap<String, String> = HashMap::new();
    for image in images {
        let src = source_dir.join(&image.original_path);
        if !src.is_file() {
            tracing::warn!("章节 {novel_slug}/{chapter_id} 引用的图片不存在：{}", image.original_path);
            continue;
        }
        let Some(filename) = src.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let data = std::fs::read(&src).io_context(|| format!("读取 {} 失败", src.display()))?;
        write_file(&out_dir.join(&filename), &data)?;
        rewritten.insert(
            image.original_path,
            chapter_image_url(novel_slug, chapter_id, &filename),
        );
    }
    Ok(rewrite_local_images(body, |path| rewritten.get(path).cloned()))
}

/// 漫画页：优先 `<id>/page*`，其次章节目录下的 `page*`，按文件名排序
fn process_manga_pages(
    ctx: &BuildContext,
    novel: &NovelConfig,
    chapter_meta: &ChapterMeta,
    source_dir: &Path,
    chapter_id: &str,
) -> BuildResult<MangaData> {
    let mut files = find_page_files(&source_dir.join(chapter_id));
    if files.is_empty() {
        files = find_page_files(source_dir);
    }

    let pattern = chapter_meta
        .extra
        .get("page_alt_pattern")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PAGE_ALT);
    let chapter_number = match chapter_meta.extra.get("chapter_number") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "?".to_string(),
    };

    let out_dir = chapter_images_dir(ctx, &novel.slug, chapter_id);
    let mut pages = Vec::with_capacity(files.len());
    for (i, file) in files.iter().enumerate() {
        let Some(filename) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let data = std::fs::read(file).io_context(|| format!("读取 {} 失败", file.display()))?;
        write_file(&out_dir.join(&filename), &data)?;
        let number = i + 1;
        pages.push(MangaPage {
            number,
            path: chapter_image_url(&novel.slug, chapter_id, &filename),
            filename,
            alt_text: pattern
                .replace("{story_title}", novel.display_title())
                .replace("{chapter_number}", &chapter_number)
                .replace("{page}", &number.to_string()),
        });
    }

    let reading_direction = chapter_meta
        .extra
        .get("reading_direction")
        .or_else(|| novel.extra.get("reading_direction"))
        .and_then(Value::as_str)
        .unwrap_or("ltr")
        .to_string();
    tracing::debug!("漫画章节 {chapter_id} 共 {} 页", pages.len());
    Ok(MangaData {
        page_count: pages.len(),
        pages,
        reading_direction,
    })
}

fn find_page_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let ext = p
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            name.starts_with("page") && MANGA_EXTENSIONS.contains(&ext.as_str())
        })
        .collect();
    files.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::build::catalog::Catalog;
    use crate::test_helpers::{ProjectBuilder, chapter_md};

    #[test]
    fn toc_lists_only_visible_chapters() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1", "c2", "c3"])
            .chapter("n", "c1", &chapter_md("First", ""))
            .chapter("n", "c2", &chapter_md("Second", "draft: true\n"))
            .chapter("n", "c3", &chapter_md("Third", ""))
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let catalog = Catalog::load(&ctx);
        let novel = catalog.get("n").unwrap();
        let count = render_novel(&mut ctx, novel, &HashMap::new()).unwrap();
        assert_eq!(count, 3);

        let toc = project.read_output("n/en/toc/index.html");
        assert!(toc.contains("First") && toc.contains("Third"));
        assert!(!toc.contains("Second"));
        assert!(!project.build_path("n/en/c2/index.html").exists());

        // 上一章/下一章跳过草稿
        let first = project.read_output("n/en/c1/index.html");
        assert!(first.contains("../c3/"));
        assert!(!first.contains("../c2/"));
    }

    #[test]
    fn chapter_images_are_copied_and_rewritten() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1"])
            .chapter("n", "c1", &chapter_md("Pic", "").replace("body text.", "![map](img/map.png)"))
            .file("content/n/chapters/img/map.png", "png")
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let catalog = Catalog::load(&ctx);
        let novel = catalog.get("n").unwrap();
        let edition = novel.primary_edition().unwrap();
        render_chapter(&mut ctx, &novel.config, edition, "c1").unwrap();

        assert_eq!(project.read_output("images/n/c1/map.png"), "png");
        let html = project.read_output("n/en/c1/index.html");
        assert!(html.contains("../../../images/n/c1/map.png"), "{html}");
    }

    #[test]
    fn manga_pages_use_alt_pattern() {
        let project = ProjectBuilder::new()
            .novel_config("m", "title: Comic\ntype: manga\narcs:\n  - title: A\n    chapters:\n      - id: c1\n        title: One\n")
            .chapter("m", "c1", &chapter_md("One", "chapter_number: 1\n"))
            .file("content/m/chapters/c1/page02.png", "2")
            .file("content/m/chapters/c1/page01.png", "1")
            .file("content/m/chapters/c1/notes.txt", "x")
            .build();
        let ctx = project.context(BuildFlags::default().fast());
        let novel = ctx.loader().load_novel_config("m").unwrap();
        let meta = ctx.loader().load_chapter(&novel, "c1", "en").unwrap().meta;
        let source = ctx.paths.chapters_dir("m");
        let data = process_manga_pages(&ctx, &novel, &meta, &source, "c1").unwrap();
        assert_eq!(data.page_count, 2);
        assert_eq!(data.pages[0].filename, "page01.png");
        assert_eq!(data.pages[1].alt_text, "Comic Chapter 1, Page 2");
        assert!(project.build_path("images/m/c1/page02.png").is_file());
    }

    #[test]
    fn manga_without_pages_is_skipped() {
        let project = ProjectBuilder::new()
            .novel_config("m", "title: Comic\ntype: manga\narcs:\n  - title: A\n    chapters:\n      - id: c1\n")
            .chapter("m", "c1", &chapter_md("One", ""))
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let catalog = Catalog::load(&ctx);
        let novel = catalog.get("m").unwrap();
        let err = render_chapter(&mut ctx, &novel.config, novel.primary_edition().unwrap(), "c1")
            .unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn password_chapter_is_encrypted() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1"])
            .chapter("n", "c1", &chapter_md("Locked", "password: pw\n").replace("body text.", "Hidden words"))
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let catalog = Catalog::load(&ctx);
        let novel = catalog.get("n").unwrap();
        render_chapter(&mut ctx, &novel.config, novel.primary_edition().unwrap(), "c1").unwrap();
        let html = project.read_output("n/en/c1/index.html");
        assert!(!html.contains("Hidden words"));
        assert!(html.contains("data-encrypted"));
    }
}
