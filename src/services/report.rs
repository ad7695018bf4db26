//! 成绩报告 - 业务能力层
//!
//! 把 [`GradingResult`] 渲染成纯文本，随结果 JSON 一起保存

use crate::models::submission::{GradedAnswer, GradingMethod, GradingResult};

const WIDTH: usize = 60;

/// 生成纯文本成绩报告
pub fn performance_report(result: &GradingResult) -> String {
    let rule = "=".repeat(WIDTH);
    let thin = "-".repeat(WIDTH);
    let method = match result.grading_method {
        GradingMethod::AnswerKey => "answer key",
        GradingMethod::SelfAssessment => "self-assessment",
    };

    let mut lines = vec![
        rule.clone(),
        "CFA LEVEL III MOCK EXAM - PERFORMANCE REPORT".to_string(),
        rule.clone(),
        format!("Exam ID:        {}", result.exam_id),
        format!("Session:        {}", result.session),
        format!("Graded at:      {}", result.graded_at.format("%Y-%m-%d %H:%M:%S")),
        format!("Grading method: {}", method),
        String::new(),
        "OVERALL".to_string(),
        thin.clone(),
        format!(
            "Score:          {:.1} / {:.1} ({:.1}%)",
            result.overall.points_earned, result.overall.points_possible, result.overall.percentage
        ),
    ];
    if let Some(accuracy) = result.overall.accuracy {
        lines.push(format!(
            "Correct:        {} / {} ({:.1}%)",
            result.summary.correct_answers, result.summary.total_questions, accuracy
        ));
    }
    lines.push(format!(
        "Answered:       {} / {}",
        result.summary.answered, result.summary.total_questions
    ));
    lines.push(format!(
        "Result:         {} (passing score {:.0}%)",
        result.summary.result, result.summary.passing_score
    ));
    lines.push(String::new());

    lines.push("TOPIC BREAKDOWN".to_string());
    lines.push(thin.clone());
    for (topic, perf) in &result.topic_performance {
        lines.push(format!(
            "{:<34} {:>5.1} / {:<5.1} {:>6.1}%",
            topic.name(),
            perf.points_earned,
            perf.points_possible,
            perf.percentage
        ));
    }
    lines.push(String::new());

    let missed: Vec<String> = result
        .detailed_answers
        .iter()
        .filter_map(|a| match a {
            GradedAnswer::Choice {
                question_number,
                is_correct: false,
                selected_answer,
                correct_answer,
                ..
            } => Some(format!(
                "Q{}: answered {}, correct {}",
                question_number,
                selected_answer.as_deref().unwrap_or("-"),
                correct_answer
            )),
            GradedAnswer::Written {
                question_id,
                part,
                unscored: true,
                ..
            } => Some(format!("{} part {}: not self-scored", question_id, part)),
            _ => None,
        })
        .collect();

    if !missed.is_empty() {
        lines.push("REVIEW".to_string());
        lines.push(thin);
        lines.extend(missed);
        lines.push(String::new());
    }

    lines.push(rule);
    let mut report = lines.join("\n");
    report.push('\n');
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Session;
    use crate::models::submission::{GradingSummary, Outcome, OverallScore, TopicPerformance};
    use crate::models::topic::Topic;
    use chrono::Local;
    use std::collections::BTreeMap;

    #[test]
    fn test_report_lists_topics_and_misses() {
        let result = GradingResult {
            exam_id: "CFA_L3_PM_X".to_string(),
            session: Session::Pm,
            graded_at: Local::now(),
            grading_method: GradingMethod::AnswerKey,
            overall: OverallScore {
                points_earned: 6.0,
                points_possible: 12.0,
                percentage: 50.0,
                accuracy: Some(50.0),
            },
            topic_performance: BTreeMap::from([(
                Topic::AssetAllocation,
                TopicPerformance {
                    correct: 1,
                    total: 2,
                    points_earned: 6.0,
                    points_possible: 12.0,
                    percentage: 50.0,
                },
            )]),
            detailed_answers: vec![GradedAnswer::Choice {
                question_number: 2,
                item_set_id: "PM_SET1".to_string(),
                topic: Topic::AssetAllocation,
                selected_answer: None,
                correct_answer: "C".to_string(),
                is_correct: false,
                points_earned: 0.0,
                points_possible: 6.0,
                explanation: String::new(),
            }],
            summary: GradingSummary {
                total_questions: 2,
                correct_answers: 1,
                answered: 1,
                passing_score: 70.0,
                result: Outcome::Fail,
            },
        };

        let report = performance_report(&result);
        assert!(report.contains("Asset Allocation"));
        assert!(report.contains("Result:         FAIL"));
        assert!(report.contains("Q2: answered -, correct C"));
        assert!(report.contains("Correct:        1 / 2"));
        assert!(report.contains("REVIEW\n"));
        assert!(report.ends_with(&format!("{}\n", "=".repeat(WIDTH))));
    }
}
