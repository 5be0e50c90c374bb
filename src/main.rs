use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

mod build;
mod check;
mod config;
mod content;
mod init;
mod project;
mod report;
mod serve;
mod template;
mod watch;
mod yaml;

#[cfg(test)]
mod test_helpers;

use build::context::RetryPolicy;
use build::pipeline::{self, BuildOptions};
use build::{BuildContext, BuildFlags};
use config::GeneratorConfig;
use project::ProjectPaths;

#[derive(Parser)]
#[command(name = "novelsite", about = "网络小说静态站点生成器", version = long_version())]
struct Cli {
    /// 项目根目录（默认当前目录）
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// 创建示例项目骨架后退出
    #[arg(long)]
    init: bool,

    /// 构建前删除构建目录与缓存
    #[arg(long)]
    clean: bool,

    /// 包含草稿章节与页面
    #[arg(long)]
    include_drafts: bool,

    /// 包含定时发布（未来日期）的章节
    #[arg(long)]
    include_scheduled: bool,

    /// 不生成 EPUB
    #[arg(long)]
    no_epub: bool,

    /// 为构建目录中的 jpg/png 生成 WebP
    #[arg(long)]
    optimize_images: bool,

    /// 关闭 HTML/CSS/JS 压缩
    #[arg(long)]
    no_minify: bool,

    /// 校验配置与内容后退出，有错误时退出码为 1
    #[arg(long)]
    validate: bool,

    /// 构建后写出 stats_report.md
    #[arg(long)]
    stats: bool,

    /// 构建后检查站内失效链接
    #[arg(long)]
    check_links: bool,

    /// 构建后做基础无障碍检查
    #[arg(long)]
    check_accessibility: bool,

    /// 构建后启动带实时刷新的开发服务器（端口默认取 novelsite.toml，未配置为 8000）
    #[arg(long, value_name = "PORT", num_args = 0..=1)]
    serve: Option<Option<u16>>,

    /// 构建后监听文件变更并增量重建
    #[arg(long)]
    watch: bool,
}

impl Cli {
    fn flags(&self, config: &GeneratorConfig) -> BuildFlags {
        BuildFlags {
            include_drafts: self.include_drafts,
            include_scheduled: self.include_scheduled,
            epub: !self.no_epub,
            minify: !self.no_minify && config.build.minify,
            optimize_images: self.optimize_images,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.init {
        std::fs::create_dir_all(&cli.root)?;
    }
    let root = cli.root.canonicalize().unwrap_or_else(|_| cli.root.clone());

    // 日志级别：RUST_LOG 优先，其次 novelsite.toml
    let default_level = GeneratorConfig::load(&root)
        .ok()
        .map(|c| c.server.log_level)
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_level)),
        )
        .init();

    if cli.init {
        if init::init_project(&root)? {
            tracing::info!("已在 {} 创建示例项目", root.display());
        } else {
            tracing::info!("{} 已有站点配置，跳过初始化", root.display());
        }
        return Ok(());
    }

    let config = GeneratorConfig::load(&root)?;
    let paths = ProjectPaths::new(&root, &config.build.output_dir);
    let mut ctx = BuildContext::new(paths, cli.flags(&config))?;
    ctx.retry = RetryPolicy::from(&config.build);

    if cli.clean {
        pipeline::clean_build_dir(&ctx)?;
    }

    if cli.validate {
        return validate(&ctx.paths);
    }

    if cli.watch || cli.serve.is_some() {
        // 编辑期间用快速模式；首次构建强制执行，保证资源映射可用
        ctx.flags = ctx.flags.fast();
        pipeline::build(
            &mut ctx,
            BuildOptions {
                clean: cli.clean,
                force: true,
            },
        )?;
        let debounce = Duration::from_millis(config.watch.debounce_ms);

        if let Some(port) = cli.serve {
            let options = serve::ServeOptions {
                host: config.server.host.clone(),
                port: port.unwrap_or(config.server.port),
                debounce,
                shutdown_timeout: Duration::from_millis(config.server.shutdown_timeout_ms),
            };
            return tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(serve::run(ctx, options));
        }
        return watch::run_blocking(&mut ctx, debounce);
    }

    pipeline::build(
        &mut ctx,
        BuildOptions {
            clean: cli.clean,
            force: false,
        },
    )?;

    if cli.stats {
        report::write_stats_report(&ctx)?;
    }
    if cli.check_links {
        let broken = report::check_links(&ctx.paths.build, &ctx.settings.site.site_url);
        report::log_broken_links(&broken);
    }
    if cli.check_accessibility {
        report::log_accessibility(&report::check_accessibility(&ctx.paths.build));
    }

    Ok(())
}

fn validate(paths: &ProjectPaths) -> anyhow::Result<()> {
    let result = check::run(paths);

    for w in &result.warnings {
        tracing::warn!("{w}");
    }
    for e in &result.errors {
        tracing::error!("{e}");
    }

    if result.passed() {
        tracing::info!("校验通过（{} 个警告）", result.warnings.len());
        Ok(())
    } else {
        anyhow::bail!(
            "校验未通过：{} 个错误，{} 个警告",
            result.errors.len(),
            result.warnings.len()
        );
    }
}

const fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\ncommit:  ",
        env!("NOVELSITE_GIT_COMMIT"),
        "\nbuild:   ",
        env!("NOVELSITE_BUILD_TIME"),
        "\ntarget:  ",
        env!("NOVELSITE_BUILD_TARGET"),
        "\nprofile: ",
        env!("NOVELSITE_BUILD_PROFILE"),
    )
}
