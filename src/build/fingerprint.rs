use crate::build::context::BuildContext;
use crate::build::error::{BuildError, BuildResult, IoContext};
use crate::config::GENERATOR_CONFIG_FILE;
use crate::project::{CONTENT_DIR, PAGES_DIR, STATIC_DIR, TEMPLATES_DIR};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 缓存记录位于构建目录内，清理构建目录即清除缓存
pub const CACHE_FILE: &str = ".build_cache.json";

const TRACKED_DIRS: [&str; 4] = [CONTENT_DIR, TEMPLATES_DIR, STATIC_DIR, PAGES_DIR];

/// 上一次成功全量构建的指纹记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCache {
    pub fingerprint: String,
    pub timestamp: String,
}

impl BuildCache {
    pub fn path(build_dir: &Path) -> PathBuf {
        build_dir.join(CACHE_FILE)
    }

    /// 读取缓存记录，不存在或损坏时返回 None
    pub fn load(build_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(Self::path(build_dir)).ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("构建缓存记录损坏，忽略：{e}");
                None
            }
        }
    }

    pub fn save(&self, build_dir: &Path) -> BuildResult<()> {
        let path = Self::path(build_dir);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| BuildError::io("序列化构建缓存失败", std::io::Error::other(e)))?;
        std::fs::write(&path, json).io_context(|| format!("写入 {} 失败", path.display()))
    }
}

/// 计算 SHA-256 哈希（十六进制）
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// 对所有影响输出的输入计算内容指纹
///
/// 覆盖四个内容目录的相对路径与文件内容、三份 YAML 配置、生成器配置、
/// 影响输出形态的开关，以及构建日期（"新章节"角标与定时发布按日变化）。
pub fn compute_fingerprint(ctx: &BuildContext) -> BuildResult<String> {
    let root = &ctx.paths.root;
    let mut hasher = Sha256::new();

    for dir_name in TRACKED_DIRS {
        let dir = root.join(dir_name);
        hasher.update(dir_name.as_bytes());
        hasher.update(b"\n");
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BuildError::io(format!("遍历 {} 失败", dir.display()), e.into())
            })?;
            if !entry.file_type().is_file() || entry.path().starts_with(&ctx.paths.build) {
                continue;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let data = std::fs::read(entry.path())
                .io_context(|| format!("读取 {} 失败", entry.path().display()))?;
            hasher.update(rel.to_string_lossy().replace('\\', "/").as_bytes());
            hasher.update(b"\0");
            hasher.update(hash_bytes(&data).as_bytes());
            hasher.update(b"\n");
        }
    }

    let config_files = [
        ctx.paths.site_config(),
        ctx.paths.authors_config(),
        ctx.paths.webring_config(),
        root.join(GENERATOR_CONFIG_FILE),
    ];
    for path in config_files {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        match std::fs::read(&path) {
            Ok(data) => hasher.update(hash_bytes(&data).as_bytes()),
            Err(_) => hasher.update(b"missing"),
        }
        hasher.update(b"\n");
    }

    hasher.update(ctx.flags.fingerprint_key().as_bytes());
    hasher.update(b"\n");
    hasher.update(ctx.now.format("%Y-%m-%d").to_string().as_bytes());

    Ok(format!("{:x}", hasher.finalize()))
}

/// 记录本次成功构建的指纹
pub fn persist_fingerprint(ctx: &BuildContext, fingerprint: &str) -> BuildResult<()> {
    let cache = BuildCache {
        fingerprint: fingerprint.to_string(),
        timestamp: ctx.now.to_rfc3339(),
    };
    cache.save(&ctx.paths.build)?;
    tracing::debug!("已保存构建指纹 {}", &fingerprint[..fingerprint.len().min(12)]);
    Ok(())
}

/// 缓存记录存在且指纹一致时跳过全量构建
pub fn should_skip_build(build_dir: &Path, fingerprint: &str) -> bool {
    BuildCache::load(build_dir).is_some_and(|cache| cache.fingerprint == fingerprint)
}

/// 删除缓存记录；窄范围重建改写输出后调用，避免之后的全量构建被错误跳过
pub fn invalidate(build_dir: &Path) -> BuildResult<()> {
    let path = BuildCache::path(build_dir);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(format!("删除 {} 失败", path.display()), e)),
    }
}
