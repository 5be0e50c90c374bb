//! 文件监听：把变更路径交给重建范围分类器，再由执行器完成重建
//!
//! 监听回调只负责转发事件；重建在调用方的线程里串行执行，不会与其他构建并发。

use crate::build::error::BuildResult;
use crate::build::events::BuildEvent;
use crate::build::incremental::{self, Outcome};
use crate::build::scope::{RebuildScope, classify};
use crate::build::BuildContext;
use crate::project::{CONTENT_DIR, PAGES_DIR, ProjectPaths, STATIC_DIR, TEMPLATES_DIR};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const WATCHED_EXTENSIONS: [&str; 10] =
    ["md", "yaml", "yml", "css", "js", "html", "jpg", "jpeg", "png", "webp"];

const IGNORED_DIRS: [&str; 4] = [".git", "__pycache__", ".vscode", "node_modules"];

/// 需要监听的目录：四个内容目录递归监听，项目根目录只看顶层配置文件
pub fn watch_roots(paths: &ProjectPaths) -> Vec<(PathBuf, RecursiveMode)> {
    let mut roots: Vec<(PathBuf, RecursiveMode)> = [CONTENT_DIR, TEMPLATES_DIR, STATIC_DIR, PAGES_DIR]
        .iter()
        .map(|dir| paths.root.join(dir))
        .filter(|dir| dir.is_dir())
        .map(|dir| (dir, RecursiveMode::Recursive))
        .collect();
    roots.push((paths.root.clone(), RecursiveMode::NonRecursive));
    roots
}

/// 变更是否值得重建；返回相对项目根目录、以 `/` 分隔的路径
pub fn relevant_path(paths: &ProjectPaths, path: &Path) -> Option<String> {
    if path.starts_with(&paths.build) {
        return None;
    }
    let rel = path.strip_prefix(&paths.root).ok()?;
    let ignored = rel.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
    });
    if ignored {
        return None;
    }
    let ext = rel.extension()?.to_str()?.to_ascii_lowercase();
    if !WATCHED_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    Some(rel.to_string_lossy().replace('\\', "/"))
}

/// 从一个 notify 事件中取出需要处理的路径；只读访问事件忽略
pub fn changed_paths(paths: &ProjectPaths, event: &Event) -> Vec<String> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    let mut changed: Vec<String> = event
        .paths
        .iter()
        .filter_map(|p| relevant_path(paths, p))
        .collect();
    changed.dedup();
    changed
}

/// 简单限流：距上一次重建不足间隔的变更直接丢弃
#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// 启动监听，事件交给 `handler`；返回的 watcher 被丢弃时停止监听
pub fn start_watcher<F>(paths: &ProjectPaths, handler: F) -> notify::Result<RecommendedWatcher>
where
    F: FnMut(notify::Result<Event>) + Send + 'static,
{
    let mut watcher = notify::recommended_watcher(handler)?;
    for (dir, mode) in watch_roots(paths) {
        watcher.watch(&dir, mode)?;
        if mode == RecursiveMode::Recursive {
            tracing::info!("正在监听 {}", dir.display());
        }
    }
    Ok(watcher)
}

/// 一次变更的处理结果
#[derive(Debug)]
pub struct ChangeReport {
    pub scope: RebuildScope,
    pub outcome: Outcome,
}

/// 分类并执行窄范围重建；需要升级时由调用方决定何时执行全量构建
pub fn apply_change(ctx: &mut BuildContext, rel_path: &str) -> ChangeReport {
    let scope = classify(rel_path);
    tracing::info!("检测到变更：{rel_path}（{scope}）");
    let outcome = incremental::execute(ctx, &scope);
    ChangeReport { scope, outcome }
}

/// 处理一次变更并同步完成必要的全量构建，返回供浏览器使用的事件
pub fn rebuild_for_change(ctx: &mut BuildContext, rel_path: &str) -> BuildEvent {
    let start = Instant::now();
    let report = apply_change(ctx, rel_path);
    let result: BuildResult<usize> = match report.outcome {
        Outcome::Rebuilt { pages } => Ok(pages),
        Outcome::Skipped => Ok(0),
        Outcome::Escalate(reason) => {
            tracing::info!("升级为全量重建：{reason}");
            incremental::rebuild(ctx, &RebuildScope::full(reason))
        }
    };
    finish_event(&report.scope, result, start)
}

pub fn finish_event(scope: &RebuildScope, result: BuildResult<usize>, start: Instant) -> BuildEvent {
    match result {
        Ok(pages) => {
            let total_ms = start.elapsed().as_millis() as u64;
            tracing::info!("重建完成（{scope}），{pages} 个文件，耗时 {total_ms}ms");
            BuildEvent::Finished {
                scope: scope.to_string(),
                total_ms,
                pages,
            }
        }
        Err(e) => {
            tracing::error!("重建失败（{scope}）：{e}");
            BuildEvent::Failed {
                error: e.to_string(),
            }
        }
    }
}

/// `--watch`：在当前线程阻塞处理变更，升级同步执行
pub fn run_blocking(ctx: &mut BuildContext, debounce: Duration) -> anyhow::Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let paths = ctx.paths.clone();
    let _watcher = start_watcher(&paths, move |res| {
        let _ = tx.send(res);
    })?;
    tracing::info!("正在监听文件变更，按 Ctrl+C 退出");

    let mut debouncer = Debouncer::new(debounce);
    for res in rx {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("文件监听错误：{e}");
                continue;
            }
        };
        for rel in changed_paths(&paths, &event) {
            if !debouncer.accept(Instant::now()) {
                tracing::debug!("防抖间隔内，忽略变更：{rel}");
                continue;
            }
            rebuild_for_change(ctx, &rel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::build::pipeline::{self, BuildOptions};
    use crate::test_helpers::{ProjectBuilder, chapter_md};
    use notify::event::{AccessKind, ModifyKind};

    fn paths() -> ProjectPaths {
        ProjectPaths::new(Path::new("/site"), "build")
    }

    #[test]
    fn filters_by_extension_and_directory() {
        let paths = paths();
        assert_eq!(
            relevant_path(&paths, Path::new("/site/content/n/chapters/c1.md")).as_deref(),
            Some("content/n/chapters/c1.md")
        );
        assert_eq!(
            relevant_path(&paths, Path::new("/site/site_config.yaml")).as_deref(),
            Some("site_config.yaml")
        );
        assert!(relevant_path(&paths, Path::new("/site/build/index.html")).is_none());
        assert!(relevant_path(&paths, Path::new("/site/content/.git/HEAD.md")).is_none());
        assert!(relevant_path(&paths, Path::new("/site/static/node_modules/x.js")).is_none());
        assert!(relevant_path(&paths, Path::new("/site/content/n/notes.txt")).is_none());
        assert!(relevant_path(&paths, Path::new("/elsewhere/a.md")).is_none());
    }

    #[test]
    fn access_events_are_ignored() {
        let paths = paths();
        let path = PathBuf::from("/site/pages/about.md");
        let read = Event::new(EventKind::Access(AccessKind::Any)).add_path(path.clone());
        assert!(changed_paths(&paths, &read).is_empty());
        let write = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path);
        assert_eq!(changed_paths(&paths, &write), vec!["pages/about.md".to_string()]);
    }

    #[test]
    fn debouncer_drops_bursts() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        let start = Instant::now();
        assert!(debouncer.accept(start));
        assert!(!debouncer.accept(start + Duration::from_millis(100)));
        assert!(debouncer.accept(start + Duration::from_millis(600)));
    }

    #[test]
    fn escalated_change_runs_full_build() {
        let project = ProjectBuilder::new()
            .novel("n", &["c1"])
            .chapter("n", "c1", &chapter_md("One", "published: 2020-01-01\n"))
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        pipeline::build(&mut ctx, BuildOptions::default()).unwrap();

        project.write(
            "content/n/config.yaml",
            "title: Renamed\narcs:\n  - title: A\n    chapters:\n      - id: c1\n",
        );
        let event = rebuild_for_change(&mut ctx, "content/n/config.yaml");
        assert!(event.should_reload());
        assert!(project.read_output("n/en/toc/index.html").contains("Renamed"));
    }
}
