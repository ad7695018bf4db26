use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::models::session::Session;
use crate::models::topic::Topic;

/// 考生作答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Answers {
    /// 下午场：题号 -> 选项字母
    Choices(BTreeMap<usize, String>),
    /// 上午场：题目 ID -> 小问 -> 作答文本
    Written(BTreeMap<String, BTreeMap<String, String>>),
}

impl Answers {
    pub fn empty_for(session: Session) -> Self {
        match session {
            Session::Am => Answers::Written(BTreeMap::new()),
            Session::Pm => Answers::Choices(BTreeMap::new()),
        }
    }

    /// 非空作答的数量（PM 按题，AM 按小问）
    pub fn answered_count(&self) -> usize {
        match self {
            Answers::Choices(map) => map.values().filter(|v| !v.trim().is_empty()).count(),
            Answers::Written(map) => map
                .values()
                .flat_map(|parts| parts.values())
                .filter(|v| !v.trim().is_empty())
                .count(),
        }
    }
}

/// 答卷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub exam_id: String,
    pub session: Session,
    #[serde(default)]
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Local>>,
    /// 超时后由系统自动交卷
    #[serde(default)]
    pub auto_submitted: bool,
    pub answers: Answers,
}

/// 上午场自评分：题目 ID -> 小问 -> 得分
pub type SelfScores = BTreeMap<String, BTreeMap<String, f64>>;

/// 评分方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradingMethod {
    AnswerKey,
    SelfAssessment,
}

/// 通过 / 未通过
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Pass => write!(f, "PASS"),
            Outcome::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallScore {
    pub points_earned: f64,
    pub points_possible: f64,
    pub percentage: f64,
    /// 仅下午场：答对题数占比
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicPerformance {
    pub correct: usize,
    pub total: usize,
    pub points_earned: f64,
    pub points_possible: f64,
    pub percentage: f64,
}

/// 单题评分明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GradedAnswer {
    Choice {
        question_number: usize,
        item_set_id: String,
        topic: Topic,
        selected_answer: Option<String>,
        correct_answer: String,
        is_correct: bool,
        points_earned: f64,
        points_possible: f64,
        explanation: String,
    },
    Written {
        question_id: String,
        part: String,
        topic: Topic,
        candidate_answer: String,
        points_earned: f64,
        points_possible: f64,
        /// 没有给出自评分
        unscored: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingSummary {
    /// PM 为选择题数，AM 为小问数
    pub total_questions: usize,
    pub correct_answers: usize,
    pub answered: usize,
    pub passing_score: f64,
    pub result: Outcome,
}

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResult {
    pub exam_id: String,
    pub session: Session,
    pub graded_at: DateTime<Local>,
    pub grading_method: GradingMethod,
    pub overall: OverallScore,
    pub topic_performance: BTreeMap<Topic, TopicPerformance>,
    pub detailed_answers: Vec<GradedAnswer>,
    pub summary: GradingSummary,
}
