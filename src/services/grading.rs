//! 评分服务 - 业务能力层
//!
//! - 下午场：与答案逐题比对，结果完全确定
//! - 上午场：不做自动评分，给出评分表由考生按 rubric 自评

use std::collections::BTreeMap;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ExamError};
use crate::models::exam::Exam;
use crate::models::question::ExamQuestions;
use crate::models::session::Session;
use crate::models::submission::{
    Answers, GradedAnswer, GradingMethod, GradingResult, GradingSummary, Outcome, OverallScore,
    SelfScores, Submission, TopicPerformance,
};
use crate::models::topic::Topic;

/// 及格线（百分比）
pub const PASSING_SCORE: f64 = 70.0;

/// 自评表中的一行（上午场的一个小问）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricItem {
    pub question_number: usize,
    pub question_id: String,
    pub topic: Topic,
    pub part: String,
    pub question: String,
    pub candidate_answer: String,
    pub model_answer: String,
    pub rubric: String,
    pub max_points: u32,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(earned: f64, possible: f64) -> f64 {
    if possible > 0.0 {
        round1(earned * 100.0 / possible)
    } else {
        0.0
    }
}

/// 忽略大小写和所有空白
fn normalize_choice(answer: &str) -> String {
    answer
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

fn check_submission(exam: &Exam, submission: &Submission, expected: Session) -> AppResult<()> {
    if exam.exam_id != submission.exam_id {
        return Err(ExamError::SubmissionMismatch {
            exam_id: exam.exam_id.clone(),
            submission_exam_id: submission.exam_id.clone(),
        }
        .into());
    }
    for actual in [exam.session, submission.session] {
        if actual != expected {
            return Err(ExamError::SessionMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn session_mismatch(expected: Session, actual: Session) -> crate::error::AppError {
    ExamError::SessionMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
    .into()
}

fn finish_topics(topics: &mut BTreeMap<Topic, TopicPerformance>) {
    for perf in topics.values_mut() {
        perf.points_earned = round1(perf.points_earned);
        perf.percentage = percentage(perf.points_earned, perf.points_possible);
    }
}

/// 下午场评分
///
/// 未作答按错误处理；答对题数在 `[0, 总题数]` 之间，同一份答卷结果恒定
pub fn grade_pm(exam: &Exam, submission: &Submission) -> AppResult<GradingResult> {
    check_submission(exam, submission, Session::Pm)?;
    let ExamQuestions::ItemSets(sets) = &exam.questions else {
        return Err(session_mismatch(Session::Pm, Session::Am));
    };
    let empty = BTreeMap::new();
    let choices = match &submission.answers {
        Answers::Choices(map) => map,
        Answers::Written(map) if map.is_empty() => &empty,
        Answers::Written(_) => return Err(session_mismatch(Session::Pm, Session::Am)),
    };

    let mut detailed = Vec::with_capacity(exam.questions.mcq_count());
    let mut topics: BTreeMap<Topic, TopicPerformance> = BTreeMap::new();
    let (mut earned, mut possible) = (0.0, 0.0);
    let (mut correct_count, mut answered) = (0, 0);

    for set in sets {
        for mcq in &set.questions {
            let correct = mcq.correct_answer.as_deref().ok_or_else(|| ExamError::MissingAnswerKey {
                exam_id: exam.exam_id.clone(),
            })?;
            let selected = choices
                .get(&mcq.question_number)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            let is_correct = selected
                .as_deref()
                .is_some_and(|s| normalize_choice(s) == normalize_choice(correct));

            let points = mcq.points as f64;
            let points_earned = if is_correct { points } else { 0.0 };
            earned += points_earned;
            possible += points;
            if selected.is_some() {
                answered += 1;
            }
            if is_correct {
                correct_count += 1;
            }

            let perf = topics.entry(set.topic).or_default();
            perf.total += 1;
            perf.points_possible += points;
            if is_correct {
                perf.correct += 1;
                perf.points_earned += points;
            }

            detailed.push(GradedAnswer::Choice {
                question_number: mcq.question_number,
                item_set_id: set.item_set_id.clone(),
                topic: set.topic,
                selected_answer: selected,
                correct_answer: correct.to_string(),
                is_correct,
                points_earned,
                points_possible: points,
                explanation: mcq.explanation.clone().unwrap_or_default(),
            });
        }
    }
    finish_topics(&mut topics);

    let total = detailed.len();
    let pct = percentage(earned, possible);
    Ok(GradingResult {
        exam_id: exam.exam_id.clone(),
        session: Session::Pm,
        graded_at: Local::now(),
        grading_method: GradingMethod::AnswerKey,
        overall: OverallScore {
            points_earned: earned,
            points_possible: possible,
            percentage: pct,
            accuracy: Some(percentage(correct_count as f64, total as f64)),
        },
        topic_performance: topics,
        detailed_answers: detailed,
        summary: GradingSummary {
            total_questions: total,
            correct_answers: correct_count,
            answered,
            passing_score: PASSING_SCORE,
            result: if pct >= PASSING_SCORE {
                Outcome::Pass
            } else {
                Outcome::Fail
            },
        },
    })
}

fn written_answer<'a>(
    answers: &'a BTreeMap<String, BTreeMap<String, String>>,
    question_id: &str,
    part: &str,
) -> &'a str {
    answers
        .get(question_id)
        .and_then(|parts| {
            parts
                .iter()
                .find(|(p, _)| p.eq_ignore_ascii_case(part))
                .map(|(_, text)| text.as_str())
        })
        .unwrap_or("")
}

fn written_answers(submission: &Submission) -> AppResult<BTreeMap<String, BTreeMap<String, String>>> {
    match &submission.answers {
        Answers::Written(map) => Ok(map.clone()),
        Answers::Choices(map) if map.is_empty() => Ok(BTreeMap::new()),
        Answers::Choices(_) => Err(session_mismatch(Session::Am, Session::Pm)),
    }
}

/// 上午场自评表
pub fn rubric_sheet(exam: &Exam, submission: &Submission) -> AppResult<Vec<RubricItem>> {
    check_submission(exam, submission, Session::Am)?;
    let ExamQuestions::ConstructedResponse(questions) = &exam.questions else {
        return Err(session_mismatch(Session::Am, Session::Pm));
    };
    let answers = written_answers(submission)?;

    let mut items = Vec::new();
    for (i, q) in questions.iter().enumerate() {
        for sq in &q.sub_questions {
            let key = q.answer_for(&sq.part);
            items.push(RubricItem {
                question_number: i + 1,
                question_id: q.question_id.clone(),
                topic: q.topic,
                part: sq.part.clone(),
                question: sq.question.clone(),
                candidate_answer: written_answer(&answers, &q.question_id, &sq.part).to_string(),
                model_answer: key.map(|k| k.answer.clone()).unwrap_or_default(),
                rubric: key.map(|k| k.rubric.clone()).unwrap_or_default(),
                max_points: sq.points,
            });
        }
    }
    Ok(items)
}

/// 上午场评分（按考生自评分）
///
/// 自评分被夹在 `[0, 小问分值]` 内；没有给分的小问记 0 分并标记为未评分。
/// 得满分的小问计入 `correct`。
pub fn grade_am(
    exam: &Exam,
    submission: &Submission,
    self_scores: &SelfScores,
) -> AppResult<GradingResult> {
    let sheet = rubric_sheet(exam, submission)?;

    let mut detailed = Vec::with_capacity(sheet.len());
    let mut topics: BTreeMap<Topic, TopicPerformance> = BTreeMap::new();
    let (mut earned, mut possible) = (0.0, 0.0);
    let (mut full_marks, mut answered) = (0, 0);

    for item in sheet {
        let max = item.max_points as f64;
        let given = self_scores
            .get(&item.question_id)
            .and_then(|parts| {
                parts
                    .iter()
                    .find(|(p, _)| p.eq_ignore_ascii_case(&item.part))
                    .map(|(_, score)| *score)
            })
            .filter(|s| s.is_finite());
        let points_earned = given.map_or(0.0, |s| s.clamp(0.0, max));

        earned += points_earned;
        possible += max;
        if !item.candidate_answer.trim().is_empty() {
            answered += 1;
        }
        let is_full = max > 0.0 && points_earned >= max;
        if is_full {
            full_marks += 1;
        }

        let perf = topics.entry(item.topic).or_default();
        perf.total += 1;
        perf.points_possible += max;
        perf.points_earned += points_earned;
        if is_full {
            perf.correct += 1;
        }

        detailed.push(GradedAnswer::Written {
            question_id: item.question_id,
            part: item.part,
            topic: item.topic,
            candidate_answer: item.candidate_answer,
            points_earned,
            points_possible: max,
            unscored: given.is_none(),
        });
    }
    finish_topics(&mut topics);

    let pct = percentage(earned, possible);
    Ok(GradingResult {
        exam_id: exam.exam_id.clone(),
        session: Session::Am,
        graded_at: Local::now(),
        grading_method: GradingMethod::SelfAssessment,
        overall: OverallScore {
            points_earned: round1(earned),
            points_possible: possible,
            percentage: pct,
            accuracy: None,
        },
        topic_performance: topics,
        summary: GradingSummary {
            total_questions: detailed.len(),
            correct_answers: full_marks,
            answered,
            passing_score: PASSING_SCORE,
            result: if pct >= PASSING_SCORE {
                Outcome::Pass
            } else {
                Outcome::Fail
            },
        },
        detailed_answers: detailed,
    })
}
