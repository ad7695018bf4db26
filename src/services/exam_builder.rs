//! 组卷服务 - 业务能力层
//!
//! 纯计算：按考纲权重分配题量、抽取教材片段、抽难度、把生成好的题目组装成 [`Exam`]。
//! 不调用 LLM，调用顺序由 `workflow::GenerationFlow` 决定。

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Local};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{AppResult, ExamError};
use crate::models::chunk::{Chunk, Corpus};
use crate::models::exam::Exam;
use crate::models::question::{ConstructedResponse, ExamQuestions, ItemSet};
use crate::models::session::{Difficulty, Session};
use crate::models::topic::Topic;
use crate::models::weights::TopicWeights;

/// 每次出题最多使用的教材片段数
pub const CHUNKS_PER_QUESTION: usize = 3;

/// 一场考试里已经生成好的题目
#[derive(Debug, Clone)]
pub enum GeneratedQuestions {
    ConstructedResponse(Vec<ConstructedResponse>),
    ItemSets(Vec<ItemSet>),
}

impl GeneratedQuestions {
    pub fn empty_for(session: Session) -> Self {
        match session {
            Session::Am => GeneratedQuestions::ConstructedResponse(Vec::new()),
            Session::Pm => GeneratedQuestions::ItemSets(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            GeneratedQuestions::ConstructedResponse(qs) => qs.len(),
            GeneratedQuestions::ItemSets(sets) => sets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 按难度权重随机抽一个难度
pub fn pick_difficulty<R: Rng>(rng: &mut R) -> Difficulty {
    WeightedIndex::new(Difficulty::ALL.iter().map(|d| d.weight()))
        .map(|dist| Difficulty::ALL[dist.sample(rng)])
        .unwrap_or_default()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// 组卷器
///
/// 职责：
/// - 最大余数法把题量分配到各主题
/// - 校验实际分布是否落在考纲区间内（容差为一道题的占比）
/// - 为每道题抽取未使用过的教材片段
/// - 打乱题目顺序、统一编号、计算试卷元数据
pub struct ExamBuilder {
    weights: TopicWeights,
}

impl ExamBuilder {
    pub fn new(weights: TopicWeights) -> Self {
        Self { weights }
    }

    /// 本场题量：指定了就用指定值（夹在场次区间内），否则在区间内随机
    pub fn question_count<R: Rng>(
        &self,
        session: Session,
        requested: Option<usize>,
        rng: &mut R,
    ) -> usize {
        let range = session.question_count_range();
        match requested {
            Some(n) => n.clamp(*range.start(), *range.end()),
            None => rng.gen_range(range),
        }
    }

    /// 最大余数法分配题量，结果之和恒等于 `total`
    ///
    /// 余数相同时 target 大的优先，再按主题规范顺序
    pub fn allocate(&self, total: usize) -> BTreeMap<Topic, usize> {
        let target_sum = self.weights.target_sum();
        let mut allocation: BTreeMap<Topic, usize> = Topic::ALL.iter().map(|t| (*t, 0)).collect();
        if total == 0 || target_sum <= 0.0 {
            return allocation;
        }

        let mut remainders = Vec::with_capacity(Topic::ALL.len());
        let mut assigned = 0;
        for topic in Topic::ALL {
            let target = self.weights.get(topic).target;
            let quota = total as f64 * target / target_sum;
            let floor = quota.floor() as usize;
            allocation.insert(topic, floor);
            assigned += floor;
            remainders.push((topic, quota - floor as f64, target));
        }

        remainders.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(b.2.total_cmp(&a.2))
                .then(a.0.cmp(&b.0))
        });
        for (topic, _, _) in remainders.into_iter().take(total.saturating_sub(assigned)) {
            *allocation.entry(topic).or_insert(0) += 1;
        }

        allocation
    }

    /// 校验主题分布，返回超出 `[min, max] ± 一道题占比` 的说明
    pub fn validate(&self, counts: &BTreeMap<Topic, usize>, total: usize) -> Vec<String> {
        if total == 0 {
            return Vec::new();
        }
        let tolerance = 100.0 / total as f64;

        let mut warnings = Vec::new();
        for (topic, weight) in self.weights.iter() {
            let count = counts.get(&topic).copied().unwrap_or(0);
            let pct = count as f64 * 100.0 / total as f64;
            if pct < weight.min - tolerance || pct > weight.max + tolerance {
                warnings.push(format!(
                    "{}: {:.1}% 不在 {:.1}%-{:.1}% 内（容差 {:.1}%）",
                    topic, pct, weight.min, weight.max, tolerance
                ));
            }
        }
        warnings
    }

    /// 把分配结果展开成按规范顺序排列的出题槽位
    pub fn plan_slots(&self, allocation: &BTreeMap<Topic, usize>) -> Vec<Topic> {
        allocation
            .iter()
            .flat_map(|(topic, n)| std::iter::repeat(*topic).take(*n))
            .collect()
    }

    /// 为某个主题抽取教材片段
    ///
    /// 排除本场已用的片段和历史已用内容；历史内容用尽时只排除本场已用的
    pub fn sample_chunks<'a, R: Rng>(
        &self,
        by_topic: &BTreeMap<Topic, Vec<&'a Chunk>>,
        topic: Topic,
        used_in_exam: &HashSet<String>,
        used_before: &BTreeSet<String>,
        rng: &mut R,
    ) -> Vec<&'a Chunk> {
        let Some(pool) = by_topic.get(&topic) else {
            return Vec::new();
        };

        let fresh: Vec<&'a Chunk> = pool
            .iter()
            .copied()
            .filter(|c| !used_in_exam.contains(&c.chunk_id) && !used_before.contains(&c.content_hash))
            .collect();

        let candidates = if fresh.is_empty() {
            debug!("{} 的未使用内容已用尽，允许复用历史内容", topic);
            pool.iter()
                .copied()
                .filter(|c| !used_in_exam.contains(&c.chunk_id))
                .collect()
        } else {
            fresh
        };

        candidates
            .choose_multiple(rng, CHUNKS_PER_QUESTION)
            .copied()
            .collect()
    }

    /// 组装试卷：打乱顺序、统一编号、计算占比和时间
    pub fn assemble<R: Rng>(
        &self,
        session: Session,
        allocation: BTreeMap<Topic, usize>,
        generated: GeneratedQuestions,
        created_at: DateTime<Local>,
        rng: &mut R,
    ) -> AppResult<Exam> {
        if generated.is_empty() {
            return Err(ExamError::EmptyExam {
                session: session.to_string(),
            }
            .into());
        }

        let questions = match generated {
            GeneratedQuestions::ConstructedResponse(mut qs) => {
                qs.shuffle(rng);
                for (i, q) in qs.iter_mut().enumerate() {
                    q.question_id = format!("AM_Q{}", i + 1);
                }
                ExamQuestions::ConstructedResponse(qs)
            }
            GeneratedQuestions::ItemSets(mut sets) => {
                sets.shuffle(rng);
                let mut number = 0;
                for (i, set) in sets.iter_mut().enumerate() {
                    set.item_set_id = format!("PM_SET{}", i + 1);
                    for mcq in &mut set.questions {
                        number += 1;
                        mcq.question_number = number;
                    }
                }
                ExamQuestions::ItemSets(sets)
            }
        };

        let total = questions.len();
        let mut counts: BTreeMap<Topic, usize> = BTreeMap::new();
        for topic in questions.topics() {
            *counts.entry(topic).or_insert(0) += 1;
        }
        let topic_percentages = Topic::ALL
            .iter()
            .map(|t| {
                let n = counts.get(t).copied().unwrap_or(0);
                (*t, round1(n as f64 * 100.0 / total as f64))
            })
            .collect();

        let weight_warnings = self.validate(&counts, total);
        for w in &weight_warnings {
            warn!("⚠️ [{}] 主题占比超出考纲区间: {}", session, w);
        }

        let total_time_minutes = session.time_minutes();
        Ok(Exam {
            exam_id: Exam::make_id(session, created_at),
            session,
            created_at,
            total_questions: total,
            total_time_minutes,
            total_points: questions.total_points(),
            topic_allocation: allocation,
            topic_percentages,
            weight_warnings,
            instructions: session.instructions(),
            time_per_question: round1(total_time_minutes as f64 / total as f64),
            questions,
        })
    }

    /// 导入结果里哪些主题一个片段都没有
    pub fn missing_topics(&self, corpus: &Corpus) -> Vec<Topic> {
        Topic::ALL
            .iter()
            .copied()
            .filter(|t| self.weights.get(*t).target > 0.0 && !corpus.topic_distribution.contains_key(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::MultipleChoice;
    use crate::models::weights::TopicWeight;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn builder() -> ExamBuilder {
        ExamBuilder::new(TopicWeights::default())
    }

    fn chunk(id: &str, topic: Topic, hash: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            content: format!("content of {}", id),
            topic,
            source_file: "book.pdf".to_string(),
            token_count: 3,
            start: 0,
            end: 0,
            content_hash: hash.to_string(),
        }
    }

    fn item_set(topic: Topic) -> ItemSet {
        ItemSet {
            item_set_id: "tmp".to_string(),
            topic,
            difficulty: Difficulty::Level2,
            vignette: "v".to_string(),
            questions: (1..=3)
                .map(|n| MultipleChoice {
                    question_number: n,
                    question_text: format!("q{}", n),
                    options: BTreeMap::from([
                        ("A".to_string(), "x".to_string()),
                        ("B".to_string(), "y".to_string()),
                    ]),
                    correct_answer: Some("A".to_string()),
                    explanation: None,
                    points: 6,
                })
                .collect(),
            total_points: 18,
            estimated_time_minutes: 15,
            source_chunks: Vec::new(),
            content_hash: String::new(),
        }
    }

    #[test]
    fn test_allocation_sums_to_total() {
        let b = builder();
        for total in 1..=40 {
            let allocation = b.allocate(total);
            assert_eq!(allocation.values().sum::<usize>(), total, "total {}", total);
        }
    }

    #[test]
    fn test_allocation_within_tolerance() {
        let b = builder();
        for total in 1..=40 {
            let allocation = b.allocate(total);
            let warnings = b.validate(&allocation, total);
            assert!(warnings.is_empty(), "total {}: {:?}", total, warnings);
        }
    }

    #[test]
    fn test_allocation_tie_break() {
        // 一道题：余数最大的是 Portfolio Management Pathway (0.325)
        let allocation = builder().allocate(1);
        assert_eq!(allocation[&Topic::PortfolioManagementPathway], 1);

        // 两个主题 target 相同：按规范顺序
        let even = ExamBuilder::new(
            TopicWeights::from_entries([
                (Topic::PortfolioConstruction, TopicWeight::new(0.0, 100.0, 50.0)),
                (Topic::AssetAllocation, TopicWeight::new(0.0, 100.0, 50.0)),
            ])
            .unwrap(),
        );
        let allocation = even.allocate(3);
        assert_eq!(allocation[&Topic::AssetAllocation], 2);
        assert_eq!(allocation[&Topic::PortfolioConstruction], 1);
    }

    #[test]
    fn test_validate_reports_out_of_range() {
        let b = builder();
        let counts = BTreeMap::from([(Topic::EthicsProfessionalStandards, 4)]);
        let warnings = b.validate(&counts, 4);
        assert!(warnings.iter().any(|w| w.contains("Ethics")));
        assert!(warnings.iter().any(|w| w.contains("Portfolio Management Pathway")));
    }

    #[test]
    fn test_question_count_respects_session_range() {
        let b = builder();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert!(Session::Am.question_count_range().contains(&b.question_count(Session::Am, None, &mut rng)));
            assert!(Session::Pm.question_count_range().contains(&b.question_count(Session::Pm, None, &mut rng)));
        }
        assert_eq!(b.question_count(Session::Pm, Some(99), &mut rng), 6);
        assert_eq!(b.question_count(Session::Am, Some(4), &mut rng), 4);
    }

    #[test]
    fn test_pick_difficulty_covers_all_levels() {
        let mut rng = StdRng::seed_from_u64(11);
        let picked: HashSet<Difficulty> = (0..200).map(|_| pick_difficulty(&mut rng)).collect();
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn test_sample_chunks_prefers_unused() {
        let chunks = vec![
            chunk("a", Topic::AssetAllocation, "h1"),
            chunk("b", Topic::AssetAllocation, "h2"),
            chunk("c", Topic::AssetAllocation, "h3"),
            chunk("d", Topic::AssetAllocation, "h4"),
        ];
        let by_topic = BTreeMap::from([(Topic::AssetAllocation, chunks.iter().collect::<Vec<_>>())]);
        let used_in_exam = HashSet::from(["a".to_string()]);
        let used_before = BTreeSet::from(["h2".to_string()]);
        let mut rng = StdRng::seed_from_u64(1);

        let b = builder();
        let picked = b.sample_chunks(&by_topic, Topic::AssetAllocation, &used_in_exam, &used_before, &mut rng);
        let ids: BTreeSet<&str> = picked.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, BTreeSet::from(["c", "d"]));

        // 历史内容全部用过时退回到只排除本场已用
        let all_before: BTreeSet<String> = ["h1", "h2", "h3", "h4"].iter().map(|s| s.to_string()).collect();
        let picked = b.sample_chunks(&by_topic, Topic::AssetAllocation, &used_in_exam, &all_before, &mut rng);
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|c| c.chunk_id != "a"));

        assert!(b
            .sample_chunks(&by_topic, Topic::PerformanceManagement, &used_in_exam, &used_before, &mut rng)
            .is_empty());
    }

    #[test]
    fn test_assemble_numbers_mcqs_globally() {
        let b = builder();
        let mut rng = StdRng::seed_from_u64(3);
        let allocation = b.allocate(4);
        let sets = vec![
            item_set(Topic::AssetAllocation),
            item_set(Topic::PortfolioConstruction),
            item_set(Topic::PortfolioManagementPathway),
            item_set(Topic::PortfolioManagementPathway),
        ];
        let exam = b
            .assemble(Session::Pm, allocation, GeneratedQuestions::ItemSets(sets), Local::now(), &mut rng)
            .unwrap();

        assert_eq!(exam.total_questions, 4);
        assert_eq!(exam.total_points, 72);
        assert_eq!(exam.time_per_question, 45.0);
        assert_eq!(exam.questions.mcq_count(), 12);
        let ExamQuestions::ItemSets(sets) = &exam.questions else {
            panic!("应为题组");
        };
        let numbers: Vec<usize> = sets
            .iter()
            .flat_map(|s| s.questions.iter().map(|q| q.question_number))
            .collect();
        assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
        assert_eq!(sets[0].item_set_id, "PM_SET1");
        assert_eq!(exam.topic_percentages[&Topic::PortfolioManagementPathway], 50.0);
    }

    #[test]
    fn test_assemble_empty_is_error() {
        let b = builder();
        let mut rng = StdRng::seed_from_u64(3);
        let err = b
            .assemble(
                Session::Am,
                b.allocate(3),
                GeneratedQuestions::empty_for(Session::Am),
                Local::now(),
                &mut rng,
            )
            .unwrap_err();
        assert!(err.to_string().contains("AM"));
    }
}
