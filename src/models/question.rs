use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::session::Difficulty;
use crate::models::topic::Topic;

/// 论述题小问
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuestion {
    pub part: String,
    pub question: String,
    pub points: u32,
}

/// 论述题参考答案与评分要点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerKeyEntry {
    pub part: String,
    pub answer: String,
    #[serde(default)]
    pub rubric: String,
}

/// 上午场论述题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructedResponse {
    pub question_id: String,
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub scenario: String,
    pub sub_questions: Vec<SubQuestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_key: Vec<AnswerKeyEntry>,
    pub total_points: u32,
    pub estimated_time_minutes: u32,
    #[serde(default)]
    pub source_chunks: Vec<String>,
    #[serde(default)]
    pub content_hash: String,
}

impl ConstructedResponse {
    /// 查找某一小问的参考答案
    pub fn answer_for(&self, part: &str) -> Option<&AnswerKeyEntry> {
        self.answer_key
            .iter()
            .find(|a| a.part.eq_ignore_ascii_case(part))
    }
}

/// 选择题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleChoice {
    /// 全卷统一编号（从 1 开始）
    pub question_number: usize,
    pub question_text: String,
    /// 选项字母 -> 选项内容
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub points: u32,
}

/// 下午场案例题组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSet {
    pub item_set_id: String,
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub vignette: String,
    pub questions: Vec<MultipleChoice>,
    pub total_points: u32,
    pub estimated_time_minutes: u32,
    #[serde(default)]
    pub source_chunks: Vec<String>,
    #[serde(default)]
    pub content_hash: String,
}

/// 试卷题目（按场次区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum ExamQuestions {
    ConstructedResponse(Vec<ConstructedResponse>),
    ItemSets(Vec<ItemSet>),
}

impl ExamQuestions {
    /// AM 为论述题道数，PM 为题组数
    pub fn len(&self) -> usize {
        match self {
            ExamQuestions::ConstructedResponse(qs) => qs.len(),
            ExamQuestions::ItemSets(sets) => sets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_points(&self) -> u32 {
        match self {
            ExamQuestions::ConstructedResponse(qs) => qs.iter().map(|q| q.total_points).sum(),
            ExamQuestions::ItemSets(sets) => sets.iter().map(|s| s.total_points).sum(),
        }
    }

    /// 每道题（题组）的主题，用于统计实际分布
    pub fn topics(&self) -> Vec<Topic> {
        match self {
            ExamQuestions::ConstructedResponse(qs) => qs.iter().map(|q| q.topic).collect(),
            ExamQuestions::ItemSets(sets) => sets.iter().map(|s| s.topic).collect(),
        }
    }

    /// 下午场全部选择题数量
    pub fn mcq_count(&self) -> usize {
        match self {
            ExamQuestions::ConstructedResponse(_) => 0,
            ExamQuestions::ItemSets(sets) => sets.iter().map(|s| s.questions.len()).sum(),
        }
    }

    /// 去掉参考答案、正确选项和解析（考生版）
    pub fn without_solutions(&self) -> Self {
        match self {
            ExamQuestions::ConstructedResponse(qs) => ExamQuestions::ConstructedResponse(
                qs.iter()
                    .cloned()
                    .map(|mut q| {
                        q.answer_key.clear();
                        q
                    })
                    .collect(),
            ),
            ExamQuestions::ItemSets(sets) => ExamQuestions::ItemSets(
                sets.iter()
                    .cloned()
                    .map(|mut set| {
                        for mcq in &mut set.questions {
                            mcq.correct_answer = None;
                            mcq.explanation = None;
                        }
                        set
                    })
                    .collect(),
            ),
        }
    }
}
