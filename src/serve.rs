//! 开发服务器：托管构建目录、注入热重载脚本、监听文件变更
//!
//! 窄范围重建在监听任务中顺序执行；需要全量构建时在后台执行，
//! 构建上下文由互斥锁保护，任何时刻只有一个构建在运行。

use crate::build::BuildContext;
use crate::build::events::BuildEvent;
use crate::build::incremental::{self, Outcome};
use crate::build::scope::{FullReason, RebuildScope};
use crate::watch::{self, Debouncer};
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast, mpsc};
use tower_http::services::ServeDir;

pub const LIVERELOAD_PATH: &str = "/__livereload";

const LIVERELOAD_SCRIPT: &str = r#"<script>(function(){var p=location.protocol==='https:'?'wss:':'ws:';var ws=new WebSocket(p+'//'+location.host+'/__livereload');ws.onmessage=function(e){try{if(JSON.parse(e.data).type==='Finished')location.reload();}catch(_){}};ws.onclose=function(){setTimeout(function(){location.reload();},2000);};})();</script>"#;

/// 开发服务器参数
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub debounce: Duration,
    pub shutdown_timeout: Duration,
}

#[derive(Clone)]
struct ServeState {
    events: broadcast::Sender<BuildEvent>,
}

/// 在 `</body>` 前插入热重载脚本；没有 `</body>` 时原样返回
pub fn inject_livereload(html: &[u8]) -> Vec<u8> {
    const BODY_END: &[u8] = b"</body>";
    let Some(pos) = html
        .windows(BODY_END.len())
        .rposition(|w| w.eq_ignore_ascii_case(BODY_END))
    else {
        return html.to_vec();
    };
    let mut out = Vec::with_capacity(html.len() + LIVERELOAD_SCRIPT.len());
    out.extend_from_slice(&html[..pos]);
    out.extend_from_slice(LIVERELOAD_SCRIPT.as_bytes());
    out.extend_from_slice(&html[pos..]);
    out
}

async fn livereload_middleware(request: axum::extract::Request, next: Next) -> Response {
    let response = next.run(request).await;
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("读取响应内容失败：{e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(inject_livereload(&bytes)))
}

async fn livereload_ws(ws: WebSocketUpgrade, State(state): State<ServeState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: ServeState) {
    let mut rx = state.events.subscribe();
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("热重载连接落后 {skipped} 条事件");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        if socket.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}

pub fn router(build_dir: &Path, events: broadcast::Sender<BuildEvent>) -> Router {
    Router::new()
        .route(LIVERELOAD_PATH, get(livereload_ws))
        .fallback_service(ServeDir::new(build_dir))
        .layer(middleware::from_fn(livereload_middleware))
        .with_state(ServeState { events })
}

/// 启动开发服务器直到收到 Ctrl+C；调用前应已完成一次构建
pub async fn run(ctx: BuildContext, options: ServeOptions) -> anyhow::Result<()> {
    let (events, _) = broadcast::channel::<BuildEvent>(64);
    let app = router(&ctx.paths.build, events.clone());
    let paths = ctx.paths.clone();
    let ctx = Arc::new(Mutex::new(ctx));

    let (tx, rx) = mpsc::unbounded_channel();
    let watcher = watch::start_watcher(&paths, move |res| {
        let _ = tx.send(res);
    })?;
    let watch_task = tokio::spawn(watch_loop(rx, paths, ctx, events, options.debounce));

    let addr = format!("{}:{}", options.host, options.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            match detect_port_process(options.port) {
                Some(info) => tracing::error!("端口 {} 已被占用：{info}", options.port),
                None => tracing::error!("端口 {} 已被占用", options.port),
            }
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!("开发服务器启动：http://{addr}");

    let timeout = options.shutdown_timeout;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("无法监听退出信号：{e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("正在关闭开发服务器...");
            arm_hard_exit(timeout);
        })
        .await?;

    watch_task.abort();
    drop(watcher);
    tracing::info!("开发服务器已关闭");
    Ok(())
}

/// 热重载连接等可能让优雅退出一直挂起，超时后直接结束进程
fn arm_hard_exit(timeout: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(timeout);
        tracing::warn!("优雅退出超时（{}ms），强制结束", timeout.as_millis());
        std::process::exit(0);
    });
}

async fn watch_loop(
    mut rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    paths: crate::project::ProjectPaths,
    ctx: Arc<Mutex<BuildContext>>,
    events: broadcast::Sender<BuildEvent>,
    debounce: Duration,
) {
    let mut debouncer = Debouncer::new(debounce);
    while let Some(res) = rx.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("文件监听错误：{e}");
                continue;
            }
        };
        for rel in watch::changed_paths(&paths, &event) {
            if !debouncer.accept(Instant::now()) {
                tracing::debug!("防抖间隔内，忽略变更：{rel}");
                continue;
            }
            let _ = events.send(BuildEvent::Started { trigger: rel.clone() });
            handle_change(ctx.clone(), events.clone(), rel).await;
        }
    }
}

/// 窄范围重建完成后立即通知浏览器；需要升级时在后台执行全量构建
async fn handle_change(ctx: Arc<Mutex<BuildContext>>, events: broadcast::Sender<BuildEvent>, rel: String) {
    let narrow_ctx = ctx.clone();
    let result = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        let mut guard = narrow_ctx.blocking_lock();
        let report = watch::apply_change(&mut guard, &rel);
        (report, start)
    })
    .await;

    let (report, start) = match result {
        Ok(r) => r,
        Err(e) => {
            let _ = events.send(BuildEvent::Failed {
                error: format!("任务执行异常: {e}"),
            });
            return;
        }
    };

    match report.outcome {
        Outcome::Rebuilt { pages } => {
            publish(&events, watch::finish_event(&report.scope, Ok(pages), start));
        }
        Outcome::Skipped => {
            tracing::debug!("无需重建：{}", report.scope);
        }
        Outcome::Escalate(reason) => {
            if let FullReason::Escalated(error) = &reason {
                let _ = events.send(BuildEvent::Failed { error: error.clone() });
            }
            tracing::info!("后台执行全量重建：{reason}");
            tokio::task::spawn_blocking(move || {
                let start = Instant::now();
                let scope = RebuildScope::full(reason);
                let mut guard = ctx.blocking_lock();
                let result = incremental::rebuild(&mut guard, &scope);
                publish(&events, watch::finish_event(&scope, result, start));
            });
        }
    }
}

/// 广播构建结果；没有浏览器连接时直接丢弃
fn publish(events: &broadcast::Sender<BuildEvent>, event: BuildEvent) {
    let reload = event.should_reload();
    match events.send(event) {
        Ok(clients) if reload => tracing::debug!("已通知 {clients} 个页面刷新"),
        Ok(_) => {}
        Err(_) => tracing::debug!("没有已连接的页面"),
    }
}

/// 通过 /proc 查找占用端口的进程（仅 Linux）
fn detect_port_process(port: u16) -> Option<String> {
    let port_hex = format!("{port:04X}");
    for net_file in ["/proc/net/tcp", "/proc/net/tcp6"] {
        let content = std::fs::read_to_string(net_file).ok()?;
        for line in content.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            // fields[1] 为 local_address，fields[3] 为状态（0A = LISTEN）
            if fields.len() < 10 || fields[3] != "0A" {
                continue;
            }
            if fields[1].rsplit(':').next() == Some(port_hex.as_str()) {
                return find_pid_by_inode(fields[9]);
            }
        }
    }
    None
}

fn find_pid_by_inode(inode: &str) -> Option<String> {
    let socket = format!("socket:[{inode}]");
    for entry in std::fs::read_dir("/proc").ok()?.flatten() {
        let pid = entry.file_name().to_string_lossy().to_string();
        if !pid.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let owns_socket = fds
            .flatten()
            .any(|fd| std::fs::read_link(fd.path()).is_ok_and(|l| l.to_string_lossy() == socket));
        if owns_socket {
            let comm = std::fs::read_to_string(entry.path().join("comm")).unwrap_or_default();
            return Some(format!("PID {pid} ({})", comm.trim()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildFlags;
    use crate::build::pipeline::{self, BuildOptions};
    use crate::test_helpers::{ProjectBuilder, TestProject, chapter_md};
    use axum::http::Request;
    use tokio::sync::broadcast::error::TryRecvError;
    use tower::ServiceExt;

    const CHAPTER_PATH: &str = "content/my-novel/chapters/chapter-1.md";

    fn served_project() -> (TestProject, BuildContext) {
        let project = ProjectBuilder::new()
            .novel("my-novel", &["chapter-1"])
            .chapter("my-novel", "chapter-1", &chapter_md("First", "published: 2020-01-01\n"))
            .build();
        let mut ctx = project.context(BuildFlags::default().fast());
        pipeline::build(&mut ctx, BuildOptions::default()).unwrap();
        (project, ctx)
    }

    #[test]
    fn script_goes_before_last_body_tag() {
        let html = b"<html><body><p>x</p></BODY></html>";
        let out = String::from_utf8(inject_livereload(html)).unwrap();
        assert!(out.contains("__livereload"));
        assert!(out.find("<script>").unwrap() < out.find("</BODY>").unwrap());
        assert_eq!(inject_livereload(b"plain"), b"plain".to_vec());
    }

    #[tokio::test]
    async fn html_responses_get_livereload() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html><body>hi</body></html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "</body>").unwrap();
        let (events, _) = broadcast::channel(4);

        let response = router(dir.path(), events.clone())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains(LIVERELOAD_PATH));

        let response = router(dir.path(), events)
            .oneshot(Request::get("/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"</body>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn chapter_change_publishes_one_reload() {
        let (project, ctx) = served_project();
        let front = project.build_path("index.html");
        let front_before = std::fs::metadata(&front).unwrap().modified().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        project.write(CHAPTER_PATH, &chapter_md("First revised", "published: 2020-01-01\n"));

        let (events, mut rx) = broadcast::channel(16);
        handle_change(Arc::new(Mutex::new(ctx)), events, CHAPTER_PATH.into()).await;

        assert!(matches!(rx.try_recv(), Ok(BuildEvent::Finished { pages: 1, .. })));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty | TryRecvError::Closed)));
        assert!(project
            .read_output("my-novel/en/chapter-1/index.html")
            .contains("First revised body text."));
        assert_eq!(std::fs::metadata(&front).unwrap().modified().unwrap(), front_before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_narrow_rebuild_reports_then_builds_in_background() {
        let (project, ctx) = served_project();
        project.write("content/my-novel/config.yaml", "arcs: [unclosed\n");

        let ctx = Arc::new(Mutex::new(ctx));
        let (events, mut rx) = broadcast::channel(16);
        handle_change(ctx.clone(), events.clone(), CHAPTER_PATH.into()).await;

        assert!(matches!(rx.recv().await, Ok(BuildEvent::Failed { .. })));
        // 全量构建跳过配置损坏的小说后照常完成
        let background = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("后台构建未在时限内完成");
        assert!(matches!(background, Ok(BuildEvent::Finished { .. })));

        // 后台构建结束后锁已释放
        let _guard = tokio::time::timeout(Duration::from_secs(5), ctx.lock())
            .await
            .expect("构建上下文仍被占用");
    }
}
