//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：创建目录布局、加载主题权重
//! 2. **命令调度**：ingest / build / start / status / submit / rubric / grade
//! 3. **资源管理**：唯一持有 [`Storage`] 和对话模型的模块
//! 4. **统计输出**：汇总导入、出题、评分结果
//!
//! 具体业务交给 services，出题流程交给 workflow。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::clients::{ChatModel, CompletionOptions, OpenAiChat};
use crate::config::Config;
use crate::error::{AppError, ExamError};
use crate::infrastructure::{PdfExtractor, Storage};
use crate::models::chunk::Corpus;
use crate::models::exam::{Exam, ExamSession};
use crate::models::session::Session;
use crate::models::submission::{Answers, GradingResult, SelfScores, Submission};
use crate::models::weights::TopicWeights;
use crate::models::load_topic_weights;
use crate::services::{
    grade_am, grade_pm, performance_report, rubric_sheet, DocumentChunker, ExamBuilder,
    ExamClock, QuestionGenerator, RubricItem,
};
use crate::utils::logging::print_final_stats;
use crate::workflow::GenerationFlow;

/// 是否是缺少 LLM 配置（API key）导致的失败
///
/// 命令行据此只给出提示，不按错误退出
pub fn is_missing_config(err: &anyhow::Error) -> bool {
    err.downcast_ref::<AppError>()
        .is_some_and(AppError::is_missing_config)
}

/// 构建考试的参数
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// 指定题量（AM 为论述题道数，PM 为题组数）
    pub count: Option<usize>,
    /// 随机种子，便于复现
    pub seed: Option<u64>,
}

/// 考试会话状态
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session: ExamSession,
    pub remaining: String,
    pub elapsed_fraction: f64,
    pub expired: bool,
}

/// 评分产物
#[derive(Debug, Clone)]
pub struct GradeOutput {
    pub result: GradingResult,
    pub result_file: PathBuf,
    pub report_file: PathBuf,
    pub report: String,
}

/// 应用主结构
pub struct App {
    config: Config,
    storage: Storage,
    weights: TopicWeights,
    model: Option<Arc<dyn ChatModel>>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let storage = Storage::from_config(&config);
        storage.ensure_layout().context("无法创建数据目录")?;

        let weights = load_topic_weights(&config.topics_file)
            .await
            .with_context(|| format!("无法加载主题权重: {}", config.topics_file.display()))?;

        Ok(Self {
            config,
            storage,
            weights,
            model: None,
        })
    }

    /// 使用指定的对话模型（测试或自定义服务）
    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn chat_model(&self) -> Result<Arc<dyn ChatModel>> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        self.config.validate_llm()?;
        Ok(Arc::new(OpenAiChat::new(&self.config)))
    }

    // ========== ingest ==========

    /// 导入教材；未指定文件时扫描教材目录
    pub async fn ingest(&self, paths: Vec<PathBuf>) -> Result<Corpus> {
        let paths = if paths.is_empty() {
            self.scan_books_dir()?
        } else {
            paths
        };
        if paths.is_empty() {
            warn!(
                "⚠️ {} 中没有找到 PDF 或 TXT 文件",
                self.config.books_dir.display()
            );
            return Ok(Corpus::default());
        }

        info!("📁 共 {} 个文件待导入", paths.len());
        let chunker = DocumentChunker::new(self.config.chunk_size)?;
        let corpus = chunker.process_files(&paths);

        let path = self.storage.corpus_path();
        self.storage.write_json(&path, &corpus)?;

        for (topic, n) in &corpus.topic_distribution {
            info!("  {} : {} 个文本块", topic, n);
        }
        info!(
            "✓ {} 个文本块, {} 道章末题, {} tokens",
            corpus.chunks.len(),
            corpus.eoc_questions.len(),
            corpus.total_tokens
        );
        print_final_stats(
            "导入完成统计",
            corpus.processed_files.len(),
            paths.len() - corpus.processed_files.len(),
            paths.len(),
            &self.config.output_log_file,
        );
        Ok(corpus)
    }

    fn scan_books_dir(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.books_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("无法读取教材目录: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && PdfExtractor::supports(p))
            .collect();
        paths.sort();
        Ok(paths)
    }

    pub fn load_corpus(&self) -> Result<Corpus> {
        let path = self.storage.corpus_path();
        if !path.exists() {
            return Err(ExamError::NoContent.into());
        }
        Ok(self.storage.read_json(&path)?)
    }

    // ========== build ==========

    /// 生成一场考试并保存（考生版、含答案版、答题卡）
    pub async fn build(&self, session: Session, options: BuildOptions) -> Result<Exam> {
        let corpus = self.load_corpus()?;
        let model = self.chat_model()?;

        let generator =
            QuestionGenerator::new(model, CompletionOptions::from_config(&self.config));
        let flow = GenerationFlow::new(
            generator,
            ExamBuilder::new(self.weights.clone()),
            &self.config,
        );

        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let used_before = self.storage.load_used_hashes()?;

        let built = flow
            .build_exam(session, &corpus, options.count, &used_before, Local::now(), &mut rng)
            .await?;
        let mut exam = built.exam;
        exam.exam_id = self.storage.available_exam_id(&exam.exam_id);

        self.storage
            .write_json(&self.storage.exam_path(&exam.exam_id), &exam.student_copy())?;
        self.storage
            .write_json(&self.storage.solutions_path(&exam.exam_id), &exam)?;
        self.storage.write_json(
            &self.storage.answer_sheet_path(&exam.exam_id),
            &exam.answer_sheet(),
        )?;
        self.storage.record_used_hashes(built.used_hashes)?;

        info!("✓ 试卷已保存: {}", self.storage.exam_path(&exam.exam_id).display());
        for (topic, pct) in exam.topic_percentages.iter().filter(|(_, p)| **p > 0.0) {
            info!("  {} : {:.1}%", topic, pct);
        }
        print_final_stats(
            &format!("{} 出题统计", exam.exam_id),
            built.stats.generated,
            built.stats.skipped,
            built.stats.slots,
            &self.config.output_log_file,
        );
        Ok(exam)
    }

    /// 读取考生版试卷
    pub fn load_exam(&self, exam_id: &str) -> Result<Exam> {
        Ok(self.storage.read_json(&self.storage.exam_path(exam_id))?)
    }

    /// 读取含答案的试卷
    pub fn load_solutions(&self, exam_id: &str) -> Result<Exam> {
        Ok(self.storage.read_json(&self.storage.solutions_path(exam_id))?)
    }

    // ========== start / status ==========

    pub fn start(&self, exam_id: &str, candidate: &str) -> Result<ExamSession> {
        self.start_at(exam_id, candidate, Local::now())
    }

    /// 开考：创建并保存考试会话
    pub fn start_at(&self, exam_id: &str, candidate: &str, now: DateTime<Local>) -> Result<ExamSession> {
        let exam = self.load_exam(exam_id)?;
        let suffix = rand::thread_rng().gen_range(1000..10_000);

        let session = ExamSession {
            session_id: ExamSession::make_id(now, suffix),
            exam_id: exam.exam_id.clone(),
            session: exam.session,
            candidate: candidate.to_string(),
            started_at: now,
            duration_minutes: exam.total_time_minutes,
            submitted: false,
            submission_file: None,
        };
        self.storage
            .write_json(&self.storage.session_path(&session.session_id), &session)?;

        let clock = ExamClock::for_session(&session);
        info!(
            "⏱️ [{}] 开考: {}，截止 {}",
            session.session_id,
            exam.exam_id,
            clock.deadline().format("%H:%M:%S")
        );
        Ok(session)
    }

    pub fn load_session(&self, session_id: &str) -> Result<ExamSession> {
        let path = self.storage.session_path(session_id);
        if !path.exists() {
            return Err(ExamError::SessionNotFound {
                session_id: session_id.to_string(),
            }
            .into());
        }
        Ok(self.storage.read_json(&path)?)
    }

    pub fn status(&self, session_id: &str) -> Result<SessionStatus> {
        self.status_at(session_id, Local::now())
    }

    pub fn status_at(&self, session_id: &str, now: DateTime<Local>) -> Result<SessionStatus> {
        let session = self.load_session(session_id)?;
        let clock = ExamClock::for_session(&session);
        Ok(SessionStatus {
            remaining: clock.format_remaining(now),
            elapsed_fraction: clock.elapsed_fraction(now),
            expired: clock.is_expired(now),
            session,
        })
    }

    // ========== submit ==========

    pub fn submit(&self, session_id: &str, answers: Answers) -> Result<(Submission, PathBuf)> {
        self.submit_at(session_id, answers, Local::now())
    }

    /// 交卷：超时自动按截止时间记录
    pub fn submit_at(
        &self,
        session_id: &str,
        answers: Answers,
        now: DateTime<Local>,
    ) -> Result<(Submission, PathBuf)> {
        let mut session = self.load_session(session_id)?;
        if session.submitted {
            return Err(ExamError::AlreadySubmitted {
                session_id: session_id.to_string(),
            }
            .into());
        }

        let clock = ExamClock::for_session(&session);
        let (submitted_at, auto_submitted) = clock.submission_time(now);
        if auto_submitted {
            warn!("⚠️ [{}] 已超时，按截止时间自动交卷", session_id);
        }

        let submission = Submission {
            exam_id: session.exam_id.clone(),
            session: session.session,
            candidate: session.candidate.clone(),
            started_at: Some(session.started_at),
            submitted_at: Some(submitted_at),
            auto_submitted,
            answers,
        };

        let path = self.storage.new_submission_path(&submission.exam_id, submission.session);
        self.storage.write_json(&path, &submission)?;

        session.submitted = true;
        session.submission_file = Some(path.display().to_string());
        self.storage
            .write_json(&self.storage.session_path(session_id), &session)?;

        info!(
            "📤 [{}] 已交卷: {} 题已作答 -> {}",
            session_id,
            submission.answers.answered_count(),
            path.display()
        );
        Ok((submission, path))
    }

    /// 读取答案文件
    ///
    /// - PM: `{"1": "A", "2": "C"}`
    /// - AM: `{"AM_Q1": {"A": "...", "B": "..."}}`
    pub fn read_answers_file(&self, session: Session, path: &Path) -> Result<Answers> {
        Ok(match session {
            Session::Pm => {
                Answers::Choices(self.storage.read_json::<BTreeMap<usize, String>>(path)?)
            }
            Session::Am => Answers::Written(
                self.storage
                    .read_json::<BTreeMap<String, BTreeMap<String, String>>>(path)?,
            ),
        })
    }

    pub fn load_submission(&self, path: &Path) -> Result<Submission> {
        Ok(self.storage.read_json(path)?)
    }

    // ========== rubric / grade ==========

    /// 上午场自评表，同时保存到 results 目录
    pub fn rubric(&self, submission: &Submission) -> Result<(Vec<RubricItem>, PathBuf)> {
        let exam = self.load_solutions(&submission.exam_id)?;
        let sheet = rubric_sheet(&exam, submission)?;

        let path = self
            .storage
            .results_dir()
            .join(format!("{}_AM_rubric.json", submission.exam_id));
        self.storage.write_json(&path, &sheet)?;
        info!("📝 自评表共 {} 个小问: {}", sheet.len(), path.display());
        Ok((sheet, path))
    }

    /// 评分并保存结果与成绩报告
    pub fn grade(&self, submission: &Submission, self_scores: Option<&SelfScores>) -> Result<GradeOutput> {
        let exam = self.load_solutions(&submission.exam_id)?;

        let result = match submission.session {
            Session::Pm => grade_pm(&exam, submission)?,
            Session::Am => {
                let empty = SelfScores::new();
                let scores = self_scores.unwrap_or(&empty);
                if scores.is_empty() {
                    warn!("⚠️ 没有提供自评分，上午场所有小问按 0 分计");
                }
                grade_am(&exam, submission, scores)?
            }
        };

        let (result_file, report_file) = self
            .storage
            .new_result_paths(&submission.exam_id, submission.session);
        let report = performance_report(&result);
        self.storage.write_json(&result_file, &result)?;
        self.storage.write_text(&report_file, &report)?;

        info!(
            "🎯 [{}] {:.1}/{:.1} ({:.1}%) {}",
            result.exam_id,
            result.overall.points_earned,
            result.overall.points_possible,
            result.overall.percentage,
            result.summary.result
        );
        for (topic, perf) in &result.topic_performance {
            info!("  {} : {:.1}%", topic, perf.percentage);
        }

        Ok(GradeOutput {
            result,
            result_file,
            report_file,
            report,
        })
    }
}
