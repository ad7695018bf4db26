use std::path::Path;

use serde::Deserialize;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, ConfigError, FileError};
use crate::models::topic::Topic;
use crate::models::weights::{TopicWeight, TopicWeights};

/// `config/topics.toml` 的文件结构
///
/// ```toml
/// [[topic]]
/// name = "Asset Allocation"
/// min = 15.0
/// max = 20.0
/// target = 17.5
/// ```
#[derive(Debug, Deserialize)]
struct TopicsFile {
    #[serde(default)]
    topic: Vec<TopicEntry>,
}

#[derive(Debug, Deserialize)]
struct TopicEntry {
    name: String,
    min: f64,
    max: f64,
    target: f64,
}

/// 解析主题权重 TOML 文本
pub fn parse_topic_weights(content: &str, origin: &str) -> AppResult<TopicWeights> {
    let file: TopicsFile = toml::from_str(content).map_err(|e| FileError::TomlParseFailed {
        path: origin.to_string(),
        source: Box::new(e),
    })?;

    let mut entries = Vec::with_capacity(file.topic.len());
    for entry in file.topic {
        let topic = Topic::parse(&entry.name).ok_or_else(|| ConfigError::InvalidTopicWeight {
            topic: entry.name.clone(),
            reason: "未知主题".to_string(),
        })?;
        entries.push((topic, TopicWeight::new(entry.min, entry.max, entry.target)));
    }

    if entries.is_empty() {
        return Err(ConfigError::InvalidTopicWeight {
            topic: "*".to_string(),
            reason: format!("{} 中没有任何 [[topic]]", origin),
        }
        .into());
    }

    TopicWeights::from_entries(entries)
}

/// 从 TOML 文件加载主题权重，文件不存在时使用内置默认值
pub async fn load_topic_weights(path: &Path) -> AppResult<TopicWeights> {
    if !path.exists() {
        warn!("⚠️ 主题配置 {} 不存在，使用默认权重", path.display());
        return Ok(TopicWeights::default());
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let weights = parse_topic_weights(&content, &path.display().to_string())?;
    info!(
        "✓ 已加载主题权重: {} ({} 个主题)",
        path.display(),
        weights.iter().count()
    );
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[topic]]
name = "Asset Allocation"
min = 40.0
max = 60.0
target = 50.0

[[topic]]
name = "ethics"
min = 40
max = 60
target = 50
"#;

    #[test]
    fn test_parse_with_aliases_and_integers() {
        let weights = parse_topic_weights(SAMPLE, "inline").unwrap();
        assert_eq!(weights.get(Topic::AssetAllocation).target, 50.0);
        assert_eq!(weights.get(Topic::EthicsProfessionalStandards).max, 60.0);
        assert_eq!(weights.get(Topic::PortfolioConstruction).target, 0.0);
    }

    #[test]
    fn test_unknown_topic_rejected() {
        let content = "[[topic]]\nname = \"Astrology\"\nmin = 1.0\nmax = 2.0\ntarget = 1.5\n";
        let err = parse_topic_weights(content, "inline").unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::InvalidTopicWeight { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let weights = load_topic_weights(&dir.path().join("none.toml")).await.unwrap();
        assert_eq!(weights, TopicWeights::default());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/topics.toml");
        let weights = tokio_test::block_on(load_topic_weights(&path)).unwrap();
        assert_eq!(weights, TopicWeights::default());
    }
}
