use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ConfigError};
use crate::models::topic::Topic;

/// 单个主题的考纲占比区间（百分比）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopicWeight {
    pub min: f64,
    pub max: f64,
    pub target: f64,
}

impl TopicWeight {
    pub const fn new(min: f64, max: f64, target: f64) -> Self {
        Self { min, max, target }
    }
}

/// 全部主题的权重表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicWeights {
    weights: BTreeMap<Topic, TopicWeight>,
}

impl Default for TopicWeights {
    fn default() -> Self {
        let weights = BTreeMap::from([
            (Topic::AssetAllocation, TopicWeight::new(15.0, 20.0, 17.5)),
            (Topic::PortfolioConstruction, TopicWeight::new(15.0, 20.0, 17.5)),
            (Topic::PerformanceManagement, TopicWeight::new(5.0, 10.0, 7.5)),
            (Topic::DerivativesRiskManagement, TopicWeight::new(10.0, 15.0, 12.5)),
            (Topic::EthicsProfessionalStandards, TopicWeight::new(10.0, 15.0, 12.5)),
            (Topic::PortfolioManagementPathway, TopicWeight::new(30.0, 35.0, 32.5)),
        ]);
        Self { weights }
    }
}

impl TopicWeights {
    /// 从 (主题, 权重) 列表构建并校验
    pub fn from_entries(entries: impl IntoIterator<Item = (Topic, TopicWeight)>) -> AppResult<Self> {
        let weights = Self {
            weights: entries.into_iter().collect(),
        };
        weights.validate()?;
        Ok(weights)
    }

    /// 获取某个主题的权重，未配置的主题视为 0
    pub fn get(&self, topic: Topic) -> TopicWeight {
        self.weights
            .get(&topic)
            .copied()
            .unwrap_or(TopicWeight::new(0.0, 0.0, 0.0))
    }

    /// 按规范顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (Topic, TopicWeight)> + '_ {
        self.weights.iter().map(|(t, w)| (*t, *w))
    }

    /// target 之和，用于归一化
    pub fn target_sum(&self) -> f64 {
        self.weights.values().map(|w| w.target).sum()
    }

    /// 校验：0 <= min <= target <= max <= 100，且 target 之和为正
    pub fn validate(&self) -> AppResult<()> {
        for (topic, w) in self.iter() {
            let invalid = |reason: String| ConfigError::InvalidTopicWeight {
                topic: topic.name().to_string(),
                reason,
            };
            if w.min < 0.0 || w.max > 100.0 {
                return Err(invalid(format!("区间 [{}, {}] 超出 0-100", w.min, w.max)).into());
            }
            if w.min > w.target || w.target > w.max {
                return Err(invalid(format!(
                    "target {} 不在 [{}, {}] 内",
                    w.target, w.min, w.max
                ))
                .into());
            }
        }
        if self.target_sum() <= 0.0 {
            return Err(ConfigError::InvalidTopicWeight {
                topic: "*".to_string(),
                reason: "target 之和必须大于 0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
