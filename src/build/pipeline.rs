use crate::build::catalog::Catalog;
use crate::build::context::BuildContext;
use crate::build::error::{BuildError, BuildResult};
use crate::build::fingerprint;
use crate::build::stages::{assets, chapters, epub, extras, finalize, front, images, pages, search, taxonomy};
use std::path::Path;
use std::time::{Duration, Instant};

/// 全量构建的调用选项
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// 构建目录已被清理，不做指纹判断
    pub clean: bool,
    /// 忽略指纹，强制重建（增量重建升级为全量时使用）
    pub force: bool,
}

/// 一次全量构建的统计
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// 指纹一致，未做任何工作
    pub skipped: bool,
    pub pages: usize,
    pub novels: usize,
    pub chapters: usize,
    pub epubs: usize,
    pub search_entries: usize,
    pub images: usize,
    pub duration: Duration,
}

/// 执行全量构建
///
/// 阶段按顺序执行，首个不可跳过的错误即中止；重新运行总是安全的。
pub fn build(ctx: &mut BuildContext, options: BuildOptions) -> BuildResult<BuildStats> {
    tracing::info!("开始构建...");
    let start = Instant::now();
    ctx.reload()?;

    let fingerprint = fingerprint::compute_fingerprint(ctx)?;
    if options.clean {
        tracing::info!("已指定清理构建，跳过指纹判断");
    } else if options.force {
        tracing::info!("已指定强制全量重建");
    } else if fingerprint::should_skip_build(&ctx.paths.build, &fingerprint) {
        tracing::info!("内容未变化，跳过构建");
        return Ok(BuildStats {
            skipped: true,
            duration: start.elapsed(),
            ..Default::default()
        });
    }

    let mut stats = run_stages(ctx)?;
    fingerprint::persist_fingerprint(ctx, &fingerprint)?;

    stats.duration = start.elapsed();
    tracing::info!(
        "构建完成，耗时 {:.2}s（共 {} 页，{} 部小说，{} 个 EPUB）",
        stats.duration.as_secs_f64(),
        stats.pages,
        stats.novels,
        stats.epubs,
    );
    Ok(stats)
}

fn run_stages(ctx: &mut BuildContext) -> BuildResult<BuildStats> {
    let mut stats = BuildStats::default();

    prepare_build_dir(ctx)?;

    let asset_map = assets::process_static(ctx)?;
    tracing::debug!("静态资源映射 {} 项", asset_map.len());
    ctx.set_asset_map(asset_map);
    assets::copy_cname(ctx)?;

    stats.pages += pages::render_all(ctx)?;

    let catalog = Catalog::load(ctx);
    let covers = front::process_covers(ctx, &catalog)?;
    stats.novels = catalog.novels.len();
    stats.chapters = catalog.chapter_count();

    finalize::finalize(ctx, &catalog)?;
    front::render_front_page(ctx, &catalog, &covers)?;
    stats.pages += 1;
    stats.pages += front::render_authors(ctx, &catalog)?;

    for novel in &catalog.novels {
        stats.pages += chapters::render_novel(ctx, novel, &covers)?;
        stats.pages += taxonomy::render_tags(ctx, novel)?;
        stats.pages += extras::render_extras(ctx, novel)?;
    }

    if ctx.flags.epub {
        stats.epubs = epub::generate_all(ctx, &catalog.novels)?;
        // 下载链接要在 EPUB 写出后才能确定
        for novel in &catalog.novels {
            for edition in &novel.editions {
                chapters::render_toc(ctx, novel, edition, &covers)?;
            }
        }
    } else {
        tracing::debug!("已跳过 EPUB 生成");
    }

    stats.search_entries = search::generate(ctx, &catalog)?;
    stats.pages += 1;

    if ctx.flags.optimize_images || ctx.settings.site.image_optimization.enabled {
        stats.images = images::optimize_images(&ctx.paths.build)?;
    }
    Ok(stats)
}

/// 删除并重建构建目录，遇到文件锁等瞬时错误按策略重试
fn prepare_build_dir(ctx: &BuildContext) -> BuildResult<()> {
    let build_dir = &ctx.paths.build;
    if build_dir.exists() {
        retry(ctx, build_dir, "删除", || std::fs::remove_dir_all(build_dir))?;
    }
    retry(ctx, build_dir, "创建", || std::fs::create_dir_all(build_dir))
}

/// 删除构建目录（`--clean`），缓存记录随之清除
pub fn clean_build_dir(ctx: &BuildContext) -> BuildResult<()> {
    let build_dir = &ctx.paths.build;
    if !build_dir.exists() {
        return Ok(());
    }
    retry(ctx, build_dir, "删除", || std::fs::remove_dir_all(build_dir))?;
    tracing::info!("已清理构建目录 {}", build_dir.display());
    Ok(())
}

fn retry(
    ctx: &BuildContext,
    path: &Path,
    action: &str,
    mut op: impl FnMut() -> std::io::Result<()>,
) -> BuildResult<()> {
    let attempts = ctx.retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                tracing::warn!("{action}构建目录失败，重试（第 {attempt} 次）：{e}");
                std::thread::sleep(ctx.retry.delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(BuildError::BuildDir {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }
    }
}
