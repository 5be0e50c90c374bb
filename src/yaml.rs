use figment::Figment;
use figment::providers::{Format, Yaml};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;

/// 解析 YAML 映射文本为类型化结构；空文本视为空映射
pub fn from_str<T: DeserializeOwned>(source: &str) -> Result<T, String> {
    if source.trim().is_empty() {
        return serde_json::from_value(Value::Object(Map::new())).map_err(|e| e.to_string());
    }
    Figment::from(Yaml::string(source))
        .extract::<T>()
        .map_err(|e| e.to_string())
}

/// 读取并解析 YAML 文件
pub fn from_file<T: DeserializeOwned>(path: &Path) -> Result<T, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("读取 {} 失败：{}", path.display(), e))?;
    from_str(&source).map_err(|e| format!("解析 {} 失败：{}", path.display(), e))
}

/// 文件存在时解析，不存在返回默认值
pub fn from_optional_file<T: DeserializeOwned + Default>(path: &Path) -> Result<T, String> {
    if path.exists() {
        from_file(path)
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default)]
        title: String,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[test]
    fn parses_mapping() {
        let s: Sample = from_str("title: Hello\ntags:\n  - a\n  - b\n").unwrap();
        assert_eq!(s.title, "Hello");
        assert_eq!(s.tags, vec!["a", "b"]);
    }

    #[test]
    fn empty_source_is_empty_mapping() {
        let s: Sample = from_str("  \n").unwrap();
        assert!(s.title.is_empty());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let r: Result<Sample, _> = from_str("title: [unclosed\n");
        assert!(r.is_err());
    }

    #[test]
    fn missing_optional_file_gives_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s: Sample = from_optional_file(&tmp.path().join("nope.yaml")).unwrap();
        assert!(s.tags.is_empty());
    }
}
