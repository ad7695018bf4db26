//! 主题分类服务 - 业务能力层
//!
//! 只负责"这段文字属于哪个主题"，不关心分块

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::models::topic::Topic;

/// 关键词主题分类器
///
/// 职责：
/// - 每个关键词一条忽略大小写、按整词匹配的正则
/// - 得分 = 各关键词命中次数之和（嵌套关键词分别计数），最高者胜出
/// - 打平时按主题的规范顺序取前者
/// - 一个都没命中时归入 [`Topic::FALLBACK`]
pub struct TopicClassifier {
    patterns: Vec<(Topic, Vec<Regex>)>,
}

impl TopicClassifier {
    pub fn new() -> AppResult<Self> {
        let mut patterns = Vec::with_capacity(Topic::ALL.len());
        for topic in Topic::ALL {
            let mut regexes = Vec::with_capacity(topic.keywords().len());
            for keyword in topic.keywords() {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
                let regex = Regex::new(&pattern).map_err(|e| {
                    AppError::Other(format!("主题 {} 的关键词正则无效 ({}): {}", topic, keyword, e))
                })?;
                regexes.push(regex);
            }
            patterns.push((topic, regexes));
        }
        Ok(Self { patterns })
    }

    /// 每个主题的命中次数
    pub fn scores(&self, text: &str) -> BTreeMap<Topic, usize> {
        self.patterns
            .iter()
            .map(|(topic, regexes)| (*topic, Self::score(regexes, text)))
            .collect()
    }

    /// 分类：总是返回六个主题之一
    pub fn classify(&self, text: &str) -> Topic {
        let mut best = (Topic::FALLBACK, 0usize);
        for (topic, regexes) in &self.patterns {
            let score = Self::score(regexes, text);
            if score > best.1 {
                best = (*topic, score);
            }
        }
        best.0
    }

    fn score(regexes: &[Regex], text: &str) -> usize {
        regexes.iter().map(|r| r.find_iter(text).count()).sum()
    }
}
