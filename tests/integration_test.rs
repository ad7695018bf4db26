use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local};

use cfa_mock_exam::error::{AppError, ExamError};
use cfa_mock_exam::models::question::ExamQuestions;
use cfa_mock_exam::models::submission::Outcome;
use cfa_mock_exam::models::{Answers, SelfScores};
use cfa_mock_exam::orchestrator::is_missing_config;
use cfa_mock_exam::{App, AppResult, BuildOptions, ChatModel, CompletionOptions, Config, Session};

const AM_REPLY: &str = r#"```json
{
  "scenario": "The Lindqvist family office is reviewing its strategic asset allocation after a liquidity event.",
  "sub_questions": [
    {"part": "A", "question": "Calculate the required return.", "points": 6},
    {"part": "B", "question": "Recommend a rebalancing policy and justify it.", "points": 8}
  ],
  "answer_key": [
    {"part": "A", "answer": "4.2% real plus inflation.", "rubric": "3 points for the formula, 3 for the result."},
    {"part": "B", "answer": "A 5% corridor around targets.", "rubric": "4 points recommendation, 4 justification."}
  ],
  "estimated_time_minutes": 18
}
```"#;

const PM_REPLY: &str = r#"{
  "vignette": "Amara Chen runs a currency overlay for a pension fund with EUR and JPY exposures.",
  "questions": [
    {"question_text": "Which hedge ratio is most appropriate?", "options": {"A": "0%", "B": "50%", "C": "100%"}, "correct_answer": "B", "explanation": "Neutral benchmark."},
    {"question_text": "The roll yield on the forward is:", "options": ["A. positive", "B. negative", "C. zero"], "correct_answer": "A.", "explanation": "Forward premium."},
    {"question_text": "Which instrument limits downside only?", "options": {"A": "Forward", "B": "Swap", "C": "Put option"}, "correct_answer": "c", "explanation": "Asymmetric payoff."}
  ],
  "estimated_time_minutes": 15
}"#;

/// 按提示词返回固定的论述题 / 题组
struct Scripted {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for Scripted {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _system_message: &str,
        user_message: &str,
        _options: CompletionOptions,
    ) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if user_message.contains("item set") {
            Ok(PM_REPLY.to_string())
        } else {
            Ok(AM_REPLY.to_string())
        }
    }
}

/// 永远返回无法解析的内容
struct Garbage {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for Garbage {
    fn model_name(&self) -> &str {
        "garbage"
    }

    async fn complete(
        &self,
        _system_message: &str,
        _user_message: &str,
        _options: CompletionOptions,
    ) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("Sorry, I cannot help with that.".to_string())
    }
}

fn test_config(root: &Path) -> Config {
    Config {
        data_dir: root.join("data"),
        exams_dir: root.join("exams"),
        books_dir: root.join("books"),
        topics_file: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/topics.toml"),
        output_log_file: root.join("output.txt").display().to_string(),
        max_generation_attempts: 2,
        ..Config::default()
    }
}

fn write_book(dir: &Path) -> PathBuf {
    let paragraphs = [
        "Strategic asset allocation sets long-term policy weights. Mean-variance optimization and \
         the efficient frontier guide the choice, while rebalancing keeps the portfolio close to \
         target. Liability-driven investing and risk budgeting extend asset allocation to \
         institutions with explicit obligations.",
        "Portfolio construction combines factor investing, smart beta and alternative investments \
         such as private equity, hedge funds and real estate. Currency management and overlay \
         strategies, together with core-satellite structures, complete the portfolio construction \
         process.",
        "Performance measurement starts with benchmarking. Performance attribution separates \
         allocation and selection effects, and the sharpe ratio, information ratio and tracking \
         error summarise risk-adjusted returns. GIPS governs performance evaluation.",
        "Derivatives such as options, futures, swaps and forwards are the core tools of risk \
         management. Hedging reduces market risk, while VaR, stress testing and scenario analysis \
         describe tail risk and downside protection.",
        "The code of ethics and the standards of professional conduct define fiduciary duty. \
         Members must manage conflicts of interest, avoid material nonpublic information, apply \
         fair dealing and check suitability as part of compliance and ethics.",
        "Private wealth management covers high net worth families, retirement planning and estate \
         planning. Tax considerations and behavioral finance shape client management for \
         individual portfolio management, pension funds, endowments and foundations.",
    ];

    // 每个主题的段落重复多次，保证至少有一个窗口完全落在该主题内
    let mut text = String::new();
    for round in 0..2 {
        for (i, p) in paragraphs.iter().enumerate() {
            text.push_str(&format!("Reading {}.{}\n\n", round + 1, i + 1));
            for _ in 0..4 {
                text.push_str(p);
                text.push_str("\n\n");
            }
        }
    }

    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("level3_curriculum.txt");
    std::fs::write(&path, text).unwrap();
    path
}

async fn app_with_corpus(root: &Path) -> (App, Arc<Scripted>) {
    let model = Arc::new(Scripted {
        calls: AtomicUsize::new(0),
    });
    let app = App::initialize(test_config(root))
        .await
        .unwrap()
        .with_model(model.clone());
    let book = write_book(&root.join("books"));
    let corpus = app.ingest(vec![book]).await.unwrap();
    assert!(!corpus.chunks.is_empty());
    (app, model)
}

#[tokio::test]
async fn test_pm_exam_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (app, model) = app_with_corpus(dir.path()).await;

    let exam = app
        .build(
            Session::Pm,
            BuildOptions {
                count: Some(4),
                seed: Some(7),
            },
        )
        .await
        .unwrap();
    assert!(!exam.questions.is_empty());
    assert_eq!(exam.questions.mcq_count(), exam.questions.len() * 3);
    assert!(model.calls.load(Ordering::SeqCst) >= exam.questions.len());
    assert!(!app.storage().load_used_hashes().unwrap().is_empty());

    // 考生版不含答案
    let student = app.load_exam(&exam.exam_id).unwrap();
    match &student.questions {
        ExamQuestions::ItemSets(sets) => {
            for mcq in sets.iter().flat_map(|s| s.questions.iter()) {
                assert!(mcq.correct_answer.is_none());
                assert!(mcq.explanation.is_none());
            }
        }
        other => panic!("expected item sets, got {:?}", other),
    }
    assert!(app
        .storage()
        .answer_sheet_path(&exam.exam_id)
        .exists());

    // 作答：大小写和空白不影响判分
    let solutions = app.load_solutions(&exam.exam_id).unwrap();
    let mut choices = BTreeMap::new();
    if let ExamQuestions::ItemSets(sets) = &solutions.questions {
        for mcq in sets.iter().flat_map(|s| s.questions.iter()) {
            let key = mcq.correct_answer.clone().unwrap();
            choices.insert(mcq.question_number, format!(" {} ", key.to_lowercase()));
        }
    }
    assert_eq!(choices.keys().next(), Some(&1));

    let now = Local::now();
    let attempt = app.start_at(&exam.exam_id, "tester", now).unwrap();
    assert_eq!(attempt.duration_minutes, 180);

    let status = app
        .status_at(&attempt.session_id, now + Duration::minutes(30))
        .unwrap();
    assert_eq!(status.remaining, "02:30:00");
    assert!(!status.expired);

    let (submission, path) = app
        .submit_at(
            &attempt.session_id,
            Answers::Choices(choices),
            now + Duration::minutes(30),
        )
        .unwrap();
    assert!(path.exists());
    assert!(!submission.auto_submitted);

    let again = app.submit_at(
        &attempt.session_id,
        Answers::empty_for(Session::Pm),
        now + Duration::minutes(31),
    );
    let err = again.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExamError>(),
        Some(ExamError::AlreadySubmitted { .. })
    ));

    let output = app.grade(&app.load_submission(&path).unwrap(), None).unwrap();
    assert_eq!(output.result.overall.percentage, 100.0);
    assert_eq!(output.result.summary.result, Outcome::Pass);
    assert_eq!(
        output.result.summary.correct_answers,
        exam.questions.mcq_count()
    );
    assert!(output.result_file.exists());
    assert!(output.report_file.exists());
    assert!(output.report.contains("PASS"));
}

#[tokio::test]
async fn test_am_exam_rubric_and_self_grading() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app_with_corpus(dir.path()).await;

    let exam = app
        .build(
            Session::Am,
            BuildOptions {
                count: Some(3),
                seed: Some(11),
            },
        )
        .await
        .unwrap();
    let n = exam.questions.len();
    assert!(n >= 1);
    assert_eq!(exam.total_points, 14 * n as u32);

    let ids: Vec<String> = match &exam.questions {
        ExamQuestions::ConstructedResponse(qs) => qs.iter().map(|q| q.question_id.clone()).collect(),
        other => panic!("expected constructed response, got {:?}", other),
    };
    assert_eq!(ids[0], "AM_Q1");

    let written = ids
        .iter()
        .map(|id| {
            (
                id.clone(),
                BTreeMap::from([
                    ("A".to_string(), "Required return is 7.4%.".to_string()),
                    ("B".to_string(), "Use a corridor rebalancing policy.".to_string()),
                ]),
            )
        })
        .collect();

    let attempt = app.start(&exam.exam_id, "tester").unwrap();
    let (submission, _) = app
        .submit(&attempt.session_id, Answers::Written(written))
        .unwrap();

    let (sheet, rubric_path) = app.rubric(&submission).unwrap();
    assert_eq!(sheet.len(), 2 * n);
    assert!(rubric_path.exists());
    assert!(sheet.iter().all(|item| !item.model_answer.is_empty()));

    // 第一题自评：超出分值的被截断
    let mut scores = SelfScores::new();
    scores.insert(
        ids[0].clone(),
        BTreeMap::from([("a".to_string(), 100.0), ("B".to_string(), 3.0)]),
    );
    let output = app.grade(&submission, Some(&scores)).unwrap();
    assert_eq!(output.result.overall.points_earned, 9.0);
    assert_eq!(output.result.overall.points_possible, 14.0 * n as f64);
    assert_eq!(output.result.summary.correct_answers, 1);
    assert_eq!(output.result.summary.result, Outcome::Fail);
}

#[tokio::test]
async fn test_late_submission_is_capped_at_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app_with_corpus(dir.path()).await;
    let exam = app
        .build(
            Session::Pm,
            BuildOptions {
                count: Some(4),
                seed: Some(3),
            },
        )
        .await
        .unwrap();

    let started = Local::now() - Duration::minutes(200);
    let attempt = app.start_at(&exam.exam_id, "late", started).unwrap();

    let status = app.status_at(&attempt.session_id, Local::now()).unwrap();
    assert!(status.expired);
    assert_eq!(status.remaining, "00:00:00");

    let (submission, _) = app
        .submit_at(
            &attempt.session_id,
            Answers::Choices(BTreeMap::from([(1, "A".to_string())])),
            Local::now(),
        )
        .unwrap();
    assert!(submission.auto_submitted);
    assert_eq!(submission.submitted_at, Some(started + Duration::minutes(180)));

    let session = app.load_session(&attempt.session_id).unwrap();
    assert!(session.submitted);
    assert!(session.submission_file.is_some());
}

#[tokio::test]
async fn test_build_without_corpus_and_with_unusable_model() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = Arc::new(Garbage {
        calls: AtomicUsize::new(0),
    });
    let app = App::initialize(test_config(dir.path()))
        .await
        .unwrap()
        .with_model(garbage.clone());

    let err = app
        .build(Session::Pm, BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExamError>(),
        Some(ExamError::NoContent)
    ));

    let book = write_book(&dir.path().join("books"));
    app.ingest(vec![book]).await.unwrap();

    let err = app
        .build(
            Session::Am,
            BuildOptions {
                count: Some(3),
                seed: Some(1),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AppError>(),
        Some(AppError::Exam(ExamError::EmptyExam { .. }))
    ));
    // 每个有内容的槽位都重试了两次
    let calls = garbage.calls.load(Ordering::SeqCst);
    assert!(calls > 0);
    assert_eq!(calls % 2, 0);
}

#[tokio::test]
async fn test_missing_api_key_is_reported_as_config_problem() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::initialize(test_config(dir.path())).await.unwrap();
    let book = write_book(&dir.path().join("books"));
    app.ingest(vec![book]).await.unwrap();

    let err = app
        .build(Session::Pm, BuildOptions::default())
        .await
        .unwrap_err();
    assert!(is_missing_config(&err));

    let other = anyhow::Error::from(ExamError::NoContent);
    assert!(!is_missing_config(&other));
}

#[tokio::test]
async fn test_repeated_builds_keep_every_exam() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = app_with_corpus(dir.path()).await;
    let options = BuildOptions {
        count: Some(4),
        seed: Some(5),
    };

    let first = app.build(Session::Pm, options.clone()).await.unwrap();
    let second = app.build(Session::Pm, options).await.unwrap();
    assert_ne!(first.exam_id, second.exam_id);
    assert!(app.storage().solutions_path(&first.exam_id).exists());
    assert!(app.storage().solutions_path(&second.exam_id).exists());
    assert_eq!(app.load_solutions(&second.exam_id).unwrap().exam_id, second.exam_id);
}

#[tokio::test]
async fn test_ingest_scans_books_dir() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::initialize(test_config(dir.path())).await.unwrap();

    // 目录不存在时返回空语料
    let empty = app.ingest(Vec::new()).await.unwrap();
    assert!(empty.is_empty());

    write_book(&dir.path().join("books"));
    std::fs::write(dir.path().join("books/notes.docx"), "ignored").unwrap();

    let corpus = app.ingest(Vec::new()).await.unwrap();
    assert_eq!(corpus.processed_files.len(), 1);
    assert_eq!(corpus.topic_distribution.len(), 6);
    assert!(app.storage().corpus_path().exists());
    assert_eq!(app.load_corpus().unwrap().chunks.len(), corpus.chunks.len());
}

#[tokio::test]
#[ignore] // 需要 OPENAI_API_KEY：cargo test -- --ignored
async fn test_live_item_set_generation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::from_env();
    config.data_dir = dir.path().join("data");
    config.exams_dir = dir.path().join("exams");
    config.output_log_file = dir.path().join("output.txt").display().to_string();

    let app = App::initialize(config).await.unwrap();
    let book = write_book(&dir.path().join("books"));
    app.ingest(vec![book]).await.unwrap();

    let exam = app
        .build(
            Session::Pm,
            BuildOptions {
                count: Some(4),
                seed: None,
            },
        )
        .await
        .unwrap();
    assert!(exam.questions.mcq_count() >= 3);
}
