//! 窄范围重建执行器
//!
//! 只处理能安全局部重建的范围；其余情况交回调用方升级为全量构建。
//! 同步升级（`--watch`）用 [`rebuild`]，开发服务器可以先取得 [`Outcome`] 再决定何时升级。

use crate::build::catalog::Edition;
use crate::build::context::BuildContext;
use crate::build::error::BuildResult;
use crate::build::fingerprint;
use crate::build::pipeline::{self, BuildOptions};
use crate::build::scope::{FullReason, RebuildScope};
use crate::build::stages::{assets, chapters, pages};

/// 一次窄范围执行的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 已写出 `pages` 个文件
    Rebuilt { pages: usize },
    /// 当前可见性规则下无需输出
    Skipped,
    /// 需要全量构建
    Escalate(FullReason),
}

/// 执行窄范围重建；任何失败都记录后转为升级，不留下半成品
pub fn execute(ctx: &mut BuildContext, scope: &RebuildScope) -> Outcome {
    let result = match scope {
        RebuildScope::Full { reason } => return Outcome::Escalate(reason.clone()),
        RebuildScope::NovelConfig { novel_slug } => {
            return Outcome::Escalate(FullReason::NovelConfig(novel_slug.clone()));
        }
        RebuildScope::NovelTemplate {
            novel_slug,
            template_name,
        } => {
            tracing::debug!("小说 {novel_slug} 的模板 {template_name} 已变更");
            ctx.invalidate_novel_env(novel_slug);
            return Outcome::Escalate(FullReason::NovelTemplate(novel_slug.clone()));
        }
        RebuildScope::StaticAsset { path } => rebuild_asset(ctx, path),
        RebuildScope::Page { slug, language } => rebuild_page(ctx, slug, language.as_deref()),
        RebuildScope::Chapter {
            novel_slug,
            chapter_id,
            language,
        } => rebuild_chapter(ctx, novel_slug, chapter_id, language.as_deref()),
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("增量重建失败（{scope}）：{e}");
            Outcome::Escalate(FullReason::Escalated(e.to_string()))
        }
    }
}

fn rebuild_asset(ctx: &BuildContext, path: &str) -> BuildResult<Outcome> {
    // 窄范围写入后构建目录与缓存记录不再一致
    fingerprint::invalidate(&ctx.paths.build)?;
    assets::copy_single(ctx, path)?;
    Ok(Outcome::Rebuilt { pages: 1 })
}

fn rebuild_page(ctx: &mut BuildContext, slug: &str, language: Option<&str>) -> BuildResult<Outcome> {
    fingerprint::invalidate(&ctx.paths.build)?;
    let language = language
        .unwrap_or_else(|| ctx.settings.site.default_language())
        .to_string();
    if pages::render_page(ctx, slug, &language)? {
        Ok(Outcome::Rebuilt { pages: 1 })
    } else {
        Ok(Outcome::Skipped)
    }
}

fn rebuild_chapter(
    ctx: &mut BuildContext,
    novel_slug: &str,
    chapter_id: &str,
    language: Option<&str>,
) -> BuildResult<Outcome> {
    fingerprint::invalidate(&ctx.paths.build)?;
    let novel = ctx.loader().load_novel_config(novel_slug)?;
    if !novel.contains_chapter(chapter_id) {
        return Ok(Outcome::Escalate(FullReason::UnlistedChapter {
            novel_slug: novel_slug.to_string(),
            chapter_id: chapter_id.to_string(),
        }));
    }
    let language = language.unwrap_or_else(|| novel.primary_language()).to_string();

    // 文件被删除或 Front Matter 损坏时返回错误，由调用方升级为全量构建
    let chapter = ctx.loader().load_chapter(&novel, chapter_id, &language)?;
    if !ctx.rules().chapter_visible(&chapter.meta) {
        tracing::info!("章节 {novel_slug}/{chapter_id}（{language}）当前不可见，跳过");
        return Ok(Outcome::Skipped);
    }

    let edition = Edition::load(ctx, &novel, &language);
    if !edition.contains(chapter_id) {
        return Ok(Outcome::Escalate(FullReason::Escalated(format!(
            "章节 {novel_slug}/{language}/{chapter_id} 未能载入目录"
        ))));
    }
    chapters::render_chapter(ctx, &novel, &edition, chapter_id)?;
    tracing::info!("已重建章节 {novel_slug}/{language}/{chapter_id}");
    Ok(Outcome::Rebuilt { pages: 1 })
}

/// 执行一次变更对应的重建，需要时同步升级为全量构建，返回写出的页面数
pub fn rebuild(ctx: &mut BuildContext, scope: &RebuildScope) -> BuildResult<usize> {
    match execute(ctx, scope) {
        Outcome::Rebuilt { pages } => Ok(pages),
        Outcome::Skipped => Ok(0),
        Outcome::Escalate(reason) => {
            tracing::info!("执行全量重建：{reason}");
            let stats = pipeline::build(
                ctx,
                BuildOptions {
                    force: true,
                    ..Default::default()
                },
            )?;
            Ok(stats.pages)
        }
    }
}
