//! 出题流程 - 流程层
//!
//! 核心职责：定义"一个出题槽位"和"一整场考试"的生成流程
//!
//! 流程顺序：
//! 1. 分配题量 → 展开成槽位
//! 2. 每个槽位：抽片段 → LLM 出题 → 校验，失败换一批片段重试
//! 3. 所有尝试都失败的槽位跳过并告警
//! 4. 组卷

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Local};
use rand::Rng;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, ExamError};
use crate::models::chunk::{Chunk, Corpus};
use crate::models::exam::Exam;
use crate::models::session::Session;
use crate::models::topic::Topic;
use crate::services::exam_builder::{pick_difficulty, ExamBuilder, GeneratedQuestions};
use crate::services::question_generator::{GenerationRequest, QuestionGenerator};
use crate::utils::logging::truncate_text;
use crate::workflow::generation_ctx::GenerationCtx;

/// 单个槽位的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResult {
    /// 生成成功
    Generated,
    /// 跳过（没有内容或多次失败）
    Skipped,
}

/// 出题统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GenerationStats {
    pub slots: usize,
    pub generated: usize,
    pub skipped: usize,
    pub llm_calls: usize,
}

/// 一场生成好的考试
#[derive(Debug, Clone)]
pub struct BuiltExam {
    pub exam: Exam,
    /// 本场用到的教材片段指纹，写入历史记录
    pub used_hashes: Vec<String>,
    pub stats: GenerationStats,
}

/// 出题流程
///
/// - 决定每个槽位的主题、难度和重试
/// - 不持有任何文件资源
/// - 只依赖业务能力（services）
pub struct GenerationFlow {
    generator: QuestionGenerator,
    builder: ExamBuilder,
    max_attempts: usize,
    verbose_logging: bool,
}

impl GenerationFlow {
    pub fn new(generator: QuestionGenerator, builder: ExamBuilder, config: &Config) -> Self {
        Self {
            generator,
            builder,
            max_attempts: config.max_generation_attempts.max(1),
            verbose_logging: config.verbose_logging,
        }
    }

    /// 生成一整场考试
    pub async fn build_exam<R: Rng + Send>(
        &self,
        session: Session,
        corpus: &Corpus,
        requested_count: Option<usize>,
        used_before: &BTreeSet<String>,
        now: DateTime<Local>,
        rng: &mut R,
    ) -> AppResult<BuiltExam> {
        if corpus.is_empty() {
            return Err(ExamError::NoContent.into());
        }

        let count = self.builder.question_count(session, requested_count, rng);
        let allocation = self.builder.allocate(count);
        let slots = self.builder.plan_slots(&allocation);
        self.log_plan(session, count, &allocation);

        for topic in self.builder.missing_topics(corpus) {
            warn!("⚠️ [{}] 教材中没有 {} 的内容，相关题目会被跳过", session, topic);
        }

        let by_topic = corpus.chunks_by_topic();
        let mut used_in_exam: HashSet<String> = HashSet::new();
        let mut used_hashes = Vec::new();
        let mut generated = GeneratedQuestions::empty_for(session);
        let mut stats = GenerationStats {
            slots: slots.len(),
            ..Default::default()
        };

        for (i, topic) in slots.iter().enumerate() {
            let ctx = GenerationCtx::new(session, i + 1, slots.len(), *topic, pick_difficulty(rng));
            let result = self
                .run_slot(
                    &ctx,
                    &by_topic,
                    &mut used_in_exam,
                    &mut used_hashes,
                    used_before,
                    &mut generated,
                    &mut stats,
                    rng,
                )
                .await?;
            match result {
                SlotResult::Generated => stats.generated += 1,
                SlotResult::Skipped => stats.skipped += 1,
            }
        }

        info!(
            "[{}] 出题完成: 成功 {}/{}，跳过 {}，LLM 调用 {} 次",
            session, stats.generated, stats.slots, stats.skipped, stats.llm_calls
        );

        let exam = self.builder.assemble(session, allocation, generated, now, rng)?;
        Ok(BuiltExam {
            exam,
            used_hashes,
            stats,
        })
    }

    /// 一个槽位：最多尝试 `max_attempts` 次，每次重新抽取片段
    #[allow(clippy::too_many_arguments)]
    async fn run_slot<'a, R: Rng + Send>(
        &self,
        ctx: &GenerationCtx,
        by_topic: &BTreeMap<Topic, Vec<&'a Chunk>>,
        used_in_exam: &mut HashSet<String>,
        used_hashes: &mut Vec<String>,
        used_before: &BTreeSet<String>,
        generated: &mut GeneratedQuestions,
        stats: &mut GenerationStats,
        rng: &mut R,
    ) -> AppResult<SlotResult> {
        for attempt in 1..=self.max_attempts {
            let chunks = self
                .builder
                .sample_chunks(by_topic, ctx.topic, used_in_exam, used_before, rng);
            if chunks.is_empty() {
                warn!("{} ⚠️ 没有可用的教材片段，跳过", ctx);
                return Ok(SlotResult::Skipped);
            }
            if self.verbose_logging {
                self.log_chunks(ctx, &chunks);
            }

            info!(
                "{} 🤖 第 {}/{} 次生成 ({:?})",
                ctx, attempt, self.max_attempts, ctx.difficulty
            );
            let req = GenerationRequest {
                topic: ctx.topic,
                difficulty: ctx.difficulty,
                chunks,
            };
            stats.llm_calls += 1;

            let outcome = match generated {
                GeneratedQuestions::ConstructedResponse(qs) => self
                    .generator
                    .generate_constructed_response(&req, ctx.provisional_id())
                    .await
                    .map(|q| qs.push(q)),
                GeneratedQuestions::ItemSets(sets) => self
                    .generator
                    .generate_item_set(&req, ctx.provisional_id())
                    .await
                    .map(|set| sets.push(set)),
            };

            match outcome {
                Ok(()) => {
                    for chunk in &req.chunks {
                        used_in_exam.insert(chunk.chunk_id.clone());
                        used_hashes.push(chunk.content_hash.clone());
                    }
                    info!("{} ✓ 生成成功", ctx);
                    return Ok(SlotResult::Generated);
                }
                Err(e) if e.is_missing_config() => return Err(e),
                Err(e) => {
                    warn!("{} ⚠️ 第 {} 次生成失败: {}", ctx, attempt, e);
                }
            }
        }

        error!("{} ❌ {} 次尝试全部失败，跳过该题", ctx, self.max_attempts);
        Ok(SlotResult::Skipped)
    }

    // ========== 日志辅助方法 ==========

    fn log_plan(&self, session: Session, count: usize, allocation: &BTreeMap<Topic, usize>) {
        info!("📋 [{}] 计划 {} 道题，模型: {}", session, count, self.generator.model_name());
        for (topic, n) in allocation.iter().filter(|(_, n)| **n > 0) {
            info!("[{}]   {} × {}", session, topic, n);
        }
    }

    fn log_chunks(&self, ctx: &GenerationCtx, chunks: &[&Chunk]) {
        for chunk in chunks {
            info!(
                "{}   片段 {}: {}",
                ctx,
                chunk.chunk_id,
                truncate_text(&chunk.content, 80)
            );
        }
    }
}
