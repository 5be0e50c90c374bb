//! EPUB 下载文件
//!
//! 每种语言一份整本 EPUB，开启 `downloads.include_arcs` 时每卷再生成一份。
//! 目录页的下载链接在本阶段之后按文件是否存在生成。

use crate::build::catalog::{ChapterEntry, Edition, NovelEntry};
use crate::build::context::BuildContext;
use crate::build::error::{BuildError, BuildResult};
use crate::content::markdown::render_markdown;
use crate::content::novel::NovelConfig;
use crate::project::STATIC_DIR;
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};

const EPUB_DIR: &str = "epub";

fn language_suffix(language: &str, primary: &str) -> String {
    if language == primary {
        String::new()
    } else {
        format!("_{language}")
    }
}

/// 整本 EPUB 相对构建目录的路径；主语言不带语言后缀
pub fn story_file(slug: &str, language: &str, primary: &str) -> String {
    format!("{STATIC_DIR}/{EPUB_DIR}/{slug}{}.epub", language_suffix(language, primary))
}

/// 单卷 EPUB 路径，卷号从 1 开始
pub fn arc_file(slug: &str, language: &str, primary: &str, arc_index: usize) -> String {
    format!(
        "{STATIC_DIR}/{EPUB_DIR}/{slug}{}_arc{}.epub",
        language_suffix(language, primary),
        arc_index + 1
    )
}

/// 为所有小说生成 EPUB；单个文件失败只记录警告
pub fn generate_all(ctx: &BuildContext, novels: &[NovelEntry]) -> BuildResult<usize> {
    let mut written = 0;
    for novel in novels {
        if !novel.config.downloads.epub_enabled {
            tracing::debug!("小说 {} 未开启 EPUB 下载", novel.slug());
            continue;
        }
        for edition in &novel.editions {
            match generate_edition(ctx, &novel.config, edition) {
                Ok(n) => written += n,
                Err(e) if e.is_skippable() => tracing::warn!("{e}"),
                Err(e) => return Err(e),
            }
        }
    }
    if written > 0 {
        tracing::info!("已生成 {written} 个 EPUB 文件");
    }
    Ok(written)
}

/// 一种语言的整本与各卷 EPUB
pub fn generate_edition(ctx: &BuildContext, novel: &NovelConfig, edition: &Edition) -> BuildResult<usize> {
    let rules = ctx.rules();
    let primary = novel.primary_language();
    let chapters: Vec<&ChapterEntry> = edition
        .chapters
        .iter()
        .filter(|c| rules.chapter_in_epub(c.meta()))
        .filter(|c| edition.language == primary || !c.chapter.translation_missing)
        .collect();
    if chapters.is_empty() {
        return Ok(0);
    }

    let mut written = 0;
    let title = novel.display_title().to_string();
    let story = story_file(&novel.slug, &edition.language, primary);
    write_epub(ctx, novel, &edition.language, &title, &chapters, &story)?;
    written += 1;

    if novel.downloads.include_arcs {
        for (index, arc) in novel.arcs.iter().enumerate() {
            let arc_chapters: Vec<&ChapterEntry> =
                chapters.iter().copied().filter(|c| c.arc_index == index).collect();
            if arc_chapters.is_empty() {
                continue;
            }
            let arc_title = format!("{title} - {}", arc.title);
            let file = arc_file(&novel.slug, &edition.language, primary, index);
            write_epub(ctx, novel, &edition.language, &arc_title, &arc_chapters, &file)?;
            written += 1;
        }
    }
    Ok(written)
}

fn write_epub(
    ctx: &BuildContext,
    novel: &NovelConfig,
    language: &str,
    title: &str,
    chapters: &[&ChapterEntry],
    rel_path: &str,
) -> BuildResult<()> {
    let epub_error = |e: &dyn std::fmt::Display| BuildError::Epub {
        target: rel_path.to_string(),
        message: e.to_string(),
    };

    let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(|e| epub_error(&e))?)
        .map_err(|e| epub_error(&e))?;
    builder.set_title(title);
    if let Some(author) = novel.author_name() {
        builder.add_author(author);
    }
    if !novel.description.is_empty() {
        builder.add_description(&novel.description);
    }
    builder.set_lang(language);
    builder.set_generator(env!("CARGO_PKG_NAME"));

    let title_page = xhtml(title, &format!("<h1>{}</h1>{}", escape(title), render_markdown(&novel.description)));
    builder
        .add_content(
            EpubContent::new("title.xhtml", title_page.as_bytes())
                .title(title)
                .reftype(ReferenceType::TitlePage),
        )
        .map_err(|e| epub_error(&e))?;

    for (index, chapter) in chapters.iter().enumerate() {
        let body = format!(
            "<h1>{}</h1>{}",
            escape(&chapter.title),
            render_markdown(&chapter.chapter.doc.body)
        );
        let page = xhtml(&chapter.title, &body);
        let file_name = format!("chapters/{:04}-{}.xhtml", index + 1, chapter.id);
        builder
            .add_content(
                EpubContent::new(file_name, page.as_bytes())
                    .title(&chapter.title)
                    .reftype(ReferenceType::Text),
            )
            .map_err(|e| epub_error(&e))?;
    }

    let mut bytes: Vec<u8> = Vec::new();
    builder.generate(&mut bytes).map_err(|e| epub_error(&e))?;
    ctx.write_output(rel_path, &bytes)?;
    tracing::debug!("已生成 EPUB：{rel_path}（{} 章）", chapters.len());
    Ok(())
}

fn xhtml(title: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
         <head><title>{}</title></head>\n<body>\n{body}\n</body>\n</html>\n",
        escape(title)
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
