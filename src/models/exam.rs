use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::models::question::ExamQuestions;
use crate::models::session::Session;
use crate::models::topic::Topic;

/// 模拟考试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub exam_id: String,
    pub session: Session,
    pub created_at: DateTime<Local>,
    pub total_questions: usize,
    pub total_time_minutes: u32,
    pub total_points: u32,
    /// 计划分配（主题 -> 题数）
    pub topic_allocation: BTreeMap<Topic, usize>,
    /// 实际生成的主题占比（百分比，一位小数）
    pub topic_percentages: BTreeMap<Topic, f64>,
    /// 超出考纲区间的主题说明
    #[serde(default)]
    pub weight_warnings: Vec<String>,
    pub instructions: Vec<String>,
    pub time_per_question: f64,
    pub questions: ExamQuestions,
}

impl Exam {
    /// `CFA_L3_{AM|PM}_{yyyymmdd_HHMMSS}`
    pub fn make_id(session: Session, at: DateTime<Local>) -> String {
        format!("CFA_L3_{}_{}", session.code(), at.format("%Y%m%d_%H%M%S"))
    }

    /// 考生版（不含答案）
    pub fn student_copy(&self) -> Self {
        Self {
            questions: self.questions.without_solutions(),
            ..self.clone()
        }
    }

    /// 生成空白答题卡
    pub fn answer_sheet(&self) -> AnswerSheet {
        let answers = match &self.questions {
            ExamQuestions::ConstructedResponse(qs) => qs
                .iter()
                .enumerate()
                .map(|(i, q)| AnswerSheetEntry::Constructed {
                    question_number: i + 1,
                    question_id: q.question_id.clone(),
                    topic: q.topic,
                    parts: q
                        .sub_questions
                        .iter()
                        .map(|s| AnswerSheetPart {
                            part: s.part.clone(),
                            points_allocated: s.points,
                        })
                        .collect(),
                })
                .collect(),
            ExamQuestions::ItemSets(sets) => sets
                .iter()
                .flat_map(|set| {
                    set.questions.iter().map(move |mcq| AnswerSheetEntry::Choice {
                        question_number: mcq.question_number,
                        item_set_id: set.item_set_id.clone(),
                        topic: set.topic,
                        points: mcq.points,
                    })
                })
                .collect(),
        };

        AnswerSheet {
            exam_id: self.exam_id.clone(),
            session: self.session,
            answers,
        }
    }
}

/// 考试会话（开考后落盘，用于计时和防止重复交卷）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    pub session_id: String,
    pub exam_id: String,
    pub session: Session,
    #[serde(default)]
    pub candidate: String,
    pub started_at: DateTime<Local>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_file: Option<String>,
}

impl ExamSession {
    /// `session_{yyyymmdd_HHMMSS}_{4 位随机数}`
    pub fn make_id(at: DateTime<Local>, suffix: u16) -> String {
        format!("session_{}_{:04}", at.format("%Y%m%d_%H%M%S"), suffix % 10_000)
    }
}

/// 答题卡
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub exam_id: String,
    pub session: Session,
    pub answers: Vec<AnswerSheetEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerSheetEntry {
    Constructed {
        question_number: usize,
        question_id: String,
        topic: Topic,
        parts: Vec<AnswerSheetPart>,
    },
    Choice {
        question_number: usize,
        item_set_id: String,
        topic: Topic,
        points: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheetPart {
    pub part: String,
    pub points_allocated: u32,
}
