use crate::build::context::{BuildContext, write_file};
use crate::build::error::{BuildError, BuildResult, IoContext};
use crate::build::fingerprint::hash_bytes;
use crate::build::stages::postprocess::{minify_css, minify_js};
use crate::content::novel::NovelConfig;
use crate::project::{CNAME_FILE, STATIC_DIR};
use crate::template::AssetMap;
use crate::template::defaults::DEFAULT_STYLE;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// 复制 static/ 到构建目录，css/js 按开关压缩后加内容哈希
///
/// 返回的映射以 static/ 下的相对路径为键；项目没有 style.css 时写入内置样式。
pub fn process_static(ctx: &BuildContext) -> BuildResult<AssetMap> {
    let src_dir = &ctx.paths.static_dir;
    let out_dir = ctx.paths.build.join(STATIC_DIR);
    let mut asset_map = AssetMap::new();

    if src_dir.is_dir() {
        for entry in WalkDir::new(src_dir).sort_by_file_name() {
            let entry = entry
                .map_err(|e| BuildError::io(format!("遍历 {} 失败", src_dir.display()), e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(src_dir) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            let data = std::fs::read(entry.path())
                .io_context(|| format!("读取 {} 失败", entry.path().display()))?;

            match bustable_ext(&rel) {
                Some(ext) => {
                    let hashed = write_hashed(&out_dir, &rel, ext, &data, ctx.flags.minify)?;
                    asset_map.insert(rel, hashed);
                }
                None => write_file(&out_dir.join(&rel), &data)?,
            }
        }
    }

    if !asset_map.contains_key("style.css") {
        let hashed = write_hashed(&out_dir, "style.css", "css", DEFAULT_STYLE.as_bytes(), ctx.flags.minify)?;
        asset_map.insert("style.css".to_string(), hashed);
    }

    tracing::info!("已处理静态资源（{} 个带哈希）", asset_map.len());
    Ok(asset_map)
}

fn bustable_ext(rel: &str) -> Option<&'static str> {
    let ext = Path::new(rel).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "css" => Some("css"),
        "js" => Some("js"),
        _ => None,
    }
}

/// 写入 `name-<sha256[:8]>.ext`，哈希基于最终写出的字节
fn write_hashed(out_dir: &Path, rel: &str, ext: &str, data: &[u8], minify: bool) -> BuildResult<String> {
    let bytes = if minify {
        let text = String::from_utf8_lossy(data);
        match ext {
            "css" => minify_css(&text).into_bytes(),
            _ => minify_js(&text).into_bytes(),
        }
    } else {
        data.to_vec()
    };
    let hash = &hash_bytes(&bytes)[..8];
    let (stem, _) = rel.rsplit_once('.').unwrap_or((rel, ext));
    let hashed = format!("{stem}-{hash}.{ext}");
    write_file(&out_dir.join(&hashed), &bytes)?;
    Ok(hashed)
}

/// 单个静态文件的快速复制：写到镜像位置，若已有带哈希的别名一并覆盖
pub fn copy_single(ctx: &BuildContext, rel: &str) -> BuildResult<()> {
    let src = ctx.paths.static_dir.join(rel);
    if !src.is_file() {
        // 删除或重命名事件：旧文件留到下次全量构建再清理
        tracing::debug!("静态文件 {rel} 不存在，跳过复制");
        return Ok(());
    }
    let data = std::fs::read(&src).io_context(|| format!("读取 {} 失败", src.display()))?;
    let out_dir = ctx.paths.build.join(STATIC_DIR);
    write_file(&out_dir.join(rel), &data)?;
    if let Some(hashed) = ctx.asset_map().get(rel)
        && hashed != rel
    {
        write_file(&out_dir.join(hashed), &data)?;
    }
    tracing::info!("已复制静态文件：{rel}");
    Ok(())
}

/// 根目录的 CNAME 原样复制
pub fn copy_cname(ctx: &BuildContext) -> BuildResult<()> {
    let src = ctx.paths.root.join(CNAME_FILE);
    if src.is_file() {
        let data = std::fs::read(&src).io_context(|| format!("读取 {} 失败", src.display()))?;
        ctx.write_output(CNAME_FILE, &data)?;
        tracing::info!("已复制 CNAME");
    }
    Ok(())
}

/// 一部小说处理后的封面：小说封面与各卷封面（相对站点根目录）
#[derive(Debug, Clone, Default)]
pub struct CoverArt {
    pub story: Option<String>,
    pub arcs: BTreeMap<usize, String>,
}

/// 把封面图复制为 `static/images/<hash>-<name>`；源路径相对小说目录，不存在时忽略
pub fn process_cover_art(ctx: &BuildContext, novel: &NovelConfig) -> BuildResult<CoverArt> {
    let mut covers = CoverArt::default();
    if let Some(cover) = &novel.front_page.cover_art {
        covers.story = copy_cover(ctx, &novel.slug, cover)?;
    }
    for (index, arc) in novel.arcs.iter().enumerate() {
        if let Some(cover) = &arc.cover_art
            && let Some(path) = copy_cover(ctx, &novel.slug, cover)?
        {
            covers.arcs.insert(index, path);
        }
    }
    Ok(covers)
}

fn copy_cover(ctx: &BuildContext, novel_slug: &str, cover: &str) -> BuildResult<Option<String>> {
    let src = ctx.paths.novel_dir(novel_slug).join(cover);
    if !src.is_file() {
        tracing::warn!("小说 {novel_slug} 的封面不存在：{cover}");
        return Ok(None);
    }
    let data = std::fs::read(&src).io_context(|| format!("读取 {} 失败", src.display()))?;
    let name = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "cover".to_string());
    let rel = format!("{STATIC_DIR}/images/{}-{name}", &hash_bytes(&data)[..8]);
    ctx.write_output(&rel, &data)?;
    Ok(Some(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::test_helpers::ProjectBuilder;

    #[test]
    fn css_and_js_get_hashed_names() {
        let project = ProjectBuilder::new()
            .file("static/style.css", "body {\n  color: red;\n}\n")
            .file("static/js/app.js", "  let a = 1;\n\n  a++;\n")
            .file("static/img/logo.png", "png")
            .build();
        let ctx = project.context(BuildFlags::default());
        let map = process_static(&ctx).unwrap();

        let css = &map["style.css"];
        assert!(css.starts_with("style-") && css.ends_with(".css"), "{css}");
        assert_eq!(project.read_output(&format!("static/{css}")), "body{color:red;}");

        let js = &map["js/app.js"];
        assert!(js.starts_with("js/app-"), "{js}");
        assert_eq!(project.read_output(&format!("static/{js}")), "let a = 1;\na++;");

        assert_eq!(project.read_output("static/img/logo.png"), "png");
        assert!(!map.contains_key("img/logo.png"));
    }

    #[test]
    fn builtin_style_when_missing() {
        let project = ProjectBuilder::new().build();
        let ctx = project.context(BuildFlags::default().fast());
        let map = process_static(&ctx).unwrap();
        assert!(project.build_path(&format!("static/{}", map["style.css"])).is_file());
    }

    #[test]
    fn single_copy_refreshes_hashed_alias() {
        let project = ProjectBuilder::new().file("static/style.css", "a{}").build();
        let mut ctx = project.context(BuildFlags::default().fast());
        let map = process_static(&ctx).unwrap();
        let hashed = map["style.css"].clone();
        ctx.set_asset_map(map);

        project.write("static/style.css", "b{}");
        copy_single(&ctx, "style.css").unwrap();
        assert_eq!(project.read_output("static/style.css"), "b{}");
        assert_eq!(project.read_output(&format!("static/{hashed}")), "b{}");

        // 不存在的文件不是错误
        copy_single(&ctx, "gone.css").unwrap();
    }

    #[test]
    fn cover_art_is_content_addressed() {
        let project = ProjectBuilder::new()
            .novel_config("n", "title: N\nfront_page:\n  cover_art: cover.jpg\narcs:\n  - title: A\n    cover_art: missing.png\n")
            .file("content/n/cover.jpg", "jpeg")
            .build();
        let ctx = project.context(BuildFlags::default());
        let novel = ctx.loader().load_novel_config("n").unwrap();
        let covers = process_cover_art(&ctx, &novel).unwrap();
        let story = covers.story.unwrap();
        assert!(story.starts_with("static/images/") && story.ends_with("-cover.jpg"));
        assert_eq!(project.read_output(&story), "jpeg");
        assert!(covers.arcs.is_empty());
    }
}
