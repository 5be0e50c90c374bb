use crate::build::context::write_file;
use crate::build::error::{BuildError, BuildResult};
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 为构建目录中的每张 jpg/png 生成同名 `.webp`；单张失败只记录警告
pub fn optimize_images(build_dir: &Path) -> BuildResult<usize> {
    let mut converted = 0;
    for path in candidates(build_dir) {
        match convert_to_webp(&path) {
            Ok(()) => converted += 1,
            Err(e) => tracing::warn!("{e}"),
        }
    }
    if converted > 0 {
        tracing::info!("已生成 {converted} 张 WebP 图片");
    }
    Ok(converted)
}

fn candidates(build_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(build_dir)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
                .unwrap_or(false)
        })
        .collect()
}

fn convert_to_webp(path: &Path) -> BuildResult<()> {
    let image_error = |message: String| BuildError::Image {
        path: path.to_path_buf(),
        message,
    };
    let input = std::fs::read(path).map_err(|e| image_error(e.to_string()))?;
    let img = image::load_from_memory(&input).map_err(|e| image_error(format!("无法解码图片：{e}")))?;

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::WebP)
        .map_err(|e| image_error(format!("WebP 编码失败：{e}")))?;
    write_file(&path.with_extension("webp"), &buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_webp_siblings_and_skips_broken_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]));
        let png = dir.path().join("images/n/c1/pic.png");
        std::fs::create_dir_all(png.parent().unwrap()).unwrap();
        img.save(&png).unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not an image").unwrap();

        assert_eq!(optimize_images(dir.path()).unwrap(), 1);
        let webp = std::fs::read(dir.path().join("images/n/c1/pic.webp")).unwrap();
        assert_eq!(image::guess_format(&webp).unwrap(), ImageFormat::WebP);
        assert!(!dir.path().join("broken.webp").exists());
    }
}
