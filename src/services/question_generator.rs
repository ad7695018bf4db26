//! 出题服务 - 业务能力层
//!
//! 只负责"给定主题、难度和教材片段，让 LLM 出一道题"，不关心重试和组卷
//!
//! LLM 的输出并不总是规整的：可能包在 Markdown 代码块里，选项可能是对象也可能是
//! `"A. ..."` 形式的数组，答案可能写成 `"B."`。这里统一做宽松解析、严格校验。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::clients::{ChatModel, CompletionOptions};
use crate::error::{AppError, AppResult, LlmError};
use crate::models::chunk::Chunk;
use crate::models::question::{
    AnswerKeyEntry, ConstructedResponse, ItemSet, MultipleChoice, SubQuestion,
};
use crate::models::session::{Difficulty, Session};
use crate::models::topic::Topic;
use crate::services::chunker::content_hash;

/// 拼接给 LLM 的教材上下文最大字符数
pub const MAX_CONTEXT_CHARS: usize = 2000;
/// 每道选择题的分值
pub const MCQ_POINTS: u32 = 6;
/// 论述题小问缺省分值
pub const DEFAULT_PART_POINTS: u32 = 6;
const DEFAULT_AM_MINUTES: u32 = 18;
const DEFAULT_PM_MINUTES: u32 = 15;

const SYSTEM_PROMPT: &str = "You are an experienced CFA Level III examination writer. \
You write realistic, scenario-based questions grounded strictly in the curriculum excerpt you are given. \
Always answer with a single JSON object and nothing else.";

/// 一次出题请求
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub topic: Topic,
    pub difficulty: Difficulty,
    pub chunks: Vec<&'a Chunk>,
}

impl GenerationRequest<'_> {
    pub fn source_chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.chunk_id.clone()).collect()
    }
}

// ========== LLM 返回结构（宽松） ==========

#[derive(Debug, Deserialize)]
struct ConstructedResponseDraft {
    #[serde(default, alias = "case", alias = "vignette")]
    scenario: String,
    #[serde(default, alias = "questions", alias = "parts")]
    sub_questions: Vec<SubQuestionDraft>,
    #[serde(default, alias = "answers", alias = "model_answers")]
    answer_key: Vec<AnswerKeyDraft>,
    #[serde(default)]
    estimated_time_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SubQuestionDraft {
    #[serde(default, alias = "letter")]
    part: String,
    #[serde(default, alias = "question_text", alias = "text")]
    question: String,
    #[serde(default)]
    points: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct AnswerKeyDraft {
    #[serde(default, alias = "letter")]
    part: String,
    #[serde(default, alias = "model_answer")]
    answer: String,
    #[serde(default, alias = "grading_criteria")]
    rubric: String,
}

#[derive(Debug, Deserialize)]
struct ItemSetDraft {
    #[serde(default, alias = "scenario", alias = "case")]
    vignette: String,
    #[serde(default)]
    questions: Vec<McqDraft>,
    #[serde(default)]
    estimated_time_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct McqDraft {
    #[serde(default, alias = "question", alias = "stem")]
    question_text: String,
    options: OptionsDraft,
    #[serde(default, alias = "answer", alias = "correct")]
    correct_answer: String,
    #[serde(default)]
    explanation: String,
}

/// 选项可能是 `{"A": "..."}`，也可能是 `["A. ...", "B. ..."]`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OptionsDraft {
    Map(BTreeMap<String, String>),
    List(Vec<String>),
}

impl OptionsDraft {
    fn normalize(self) -> BTreeMap<String, String> {
        match self {
            OptionsDraft::Map(map) => map
                .into_iter()
                .filter_map(|(k, v)| normalize_letter(&k).map(|letter| (letter, v.trim().to_string())))
                .collect(),
            OptionsDraft::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| split_labelled_option(&item, i))
                .collect(),
        }
    }
}

// ========== 解析辅助函数 ==========

/// 去掉 Markdown 代码块包裹
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 跳过语言标记（```json）
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// 解析 LLM 回复中的 JSON 对象
///
/// 先去掉代码块；仍然解析失败时取第一个 `{` 到最后一个 `}` 之间的内容再试一次
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> AppResult<T> {
    let body = strip_code_fences(reply);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let inner = match (body.find('{'), body.rfind('}')) {
                (Some(start), Some(end)) if start < end => &body[start..=end],
                _ => {
                    return Err(LlmError::JsonParseFailed {
                        response: crate::utils::logging::truncate_text(reply, 200),
                        source: first_err,
                    }
                    .into())
                }
            };
            serde_json::from_str(inner).map_err(|source| {
                LlmError::JsonParseFailed {
                    response: crate::utils::logging::truncate_text(reply, 200),
                    source,
                }
                .into()
            })
        }
    }
}

/// `"b"` / `"B."` / `"(B)"` / `"B) text"` -> `"B"`
fn normalize_letter(raw: &str) -> Option<String> {
    let t = raw.trim().trim_start_matches('(');
    let mut chars = t.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    match chars.next() {
        None => Some(first.to_ascii_uppercase().to_string()),
        Some(c) if !c.is_alphanumeric() => Some(first.to_ascii_uppercase().to_string()),
        Some(_) => None,
    }
}

/// `"A. text"` -> ("A", "text")；没有标签时按位置编号
fn split_labelled_option(item: &str, index: usize) -> (String, String) {
    let trimmed = item.trim();
    let t = trimmed.trim_start_matches('(');
    let mut chars = t.char_indices();
    if let (Some((_, letter)), Some((sep_at, sep))) = (chars.next(), chars.next()) {
        if letter.is_ascii_alphabetic() && matches!(sep, '.' | ')' | ':') {
            let text = t[sep_at + sep.len_utf8()..].trim();
            return (letter.to_ascii_uppercase().to_string(), text.to_string());
        }
    }
    let letter = (b'A' + (index % 26) as u8) as char;
    (letter.to_string(), trimmed.to_string())
}

/// 拼接教材上下文，总长度不超过 [`MAX_CONTEXT_CHARS`]
pub fn build_context(chunks: &[&Chunk]) -> String {
    let joined = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    if joined.chars().count() > MAX_CONTEXT_CHARS {
        joined.chars().take(MAX_CONTEXT_CHARS).collect()
    } else {
        joined
    }
}

// ========== Prompt ==========

fn constructed_response_prompt(req: &GenerationRequest<'_>) -> String {
    format!(
        r#"Write ONE constructed-response question for the morning (AM) session of the CFA Level III exam.

Topic: {topic}
Difficulty: {difficulty:?} ({description})

Curriculum excerpt:
"""
{context}
"""

Requirements:
- A realistic client or institutional case scenario with concrete figures where useful.
- Two to four parts labelled A, B, C, D; each part states what the candidate must do (calculate, justify, recommend).
- Points per part between 4 and 10; the question should take 15 to 20 minutes.
- A model answer and a grading rubric for every part.

Respond with JSON only, in exactly this shape:
{{
  "scenario": "...",
  "sub_questions": [{{"part": "A", "question": "...", "points": 6}}],
  "answer_key": [{{"part": "A", "answer": "...", "rubric": "..."}}],
  "estimated_time_minutes": 18
}}"#,
        topic = req.topic,
        difficulty = req.difficulty,
        description = req.difficulty.description(),
        context = build_context(&req.chunks),
    )
}

fn item_set_prompt(req: &GenerationRequest<'_>, questions: usize) -> String {
    format!(
        r#"Write ONE item set for the afternoon (PM) session of the CFA Level III exam.

Topic: {topic}
Difficulty: {difficulty:?} ({description})

Curriculum excerpt:
"""
{context}
"""

Requirements:
- A vignette describing a realistic portfolio management situation with the data the questions need.
- Exactly {questions} multiple-choice questions that depend on the vignette.
- Each question has options A, B, C and D with exactly one correct answer.
- A short explanation of why the correct answer is right.

Respond with JSON only, in exactly this shape:
{{
  "vignette": "...",
  "questions": [
    {{"question_text": "...", "options": {{"A": "...", "B": "...", "C": "...", "D": "..."}}, "correct_answer": "B", "explanation": "..."}}
  ],
  "estimated_time_minutes": 15
}}"#,
        topic = req.topic,
        difficulty = req.difficulty,
        description = req.difficulty.description(),
        context = build_context(&req.chunks),
        questions = questions,
    )
}

// ========== 校验 ==========

fn validate_constructed_response(
    draft: ConstructedResponseDraft,
    req: &GenerationRequest<'_>,
    question_id: String,
) -> AppResult<ConstructedResponse> {
    let scenario = draft.scenario.trim().to_string();
    if scenario.is_empty() {
        return Err(AppError::invalid_question("论述题缺少 scenario"));
    }

    let mut sub_questions = Vec::with_capacity(draft.sub_questions.len());
    for (i, sq) in draft.sub_questions.into_iter().enumerate() {
        let question = sq.question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::invalid_question(format!("第 {} 小问没有题干", i + 1)));
        }
        let part = normalize_letter(&sq.part)
            .unwrap_or_else(|| ((b'A' + (i % 26) as u8) as char).to_string());
        sub_questions.push(SubQuestion {
            part,
            question,
            points: sq.points.filter(|p| *p > 0).unwrap_or(DEFAULT_PART_POINTS),
        });
    }
    if sub_questions.is_empty() {
        return Err(AppError::invalid_question("论述题没有任何小问"));
    }

    let answer_key = draft
        .answer_key
        .into_iter()
        .enumerate()
        .filter(|(_, a)| !a.answer.trim().is_empty())
        .map(|(i, a)| AnswerKeyEntry {
            part: normalize_letter(&a.part)
                .unwrap_or_else(|| ((b'A' + (i % 26) as u8) as char).to_string()),
            answer: a.answer.trim().to_string(),
            rubric: a.rubric.trim().to_string(),
        })
        .collect();

    Ok(ConstructedResponse {
        question_id,
        topic: req.topic,
        difficulty: req.difficulty,
        total_points: sub_questions.iter().map(|s| s.points).sum(),
        content_hash: content_hash(&scenario),
        scenario,
        sub_questions,
        answer_key,
        estimated_time_minutes: draft
            .estimated_time_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_AM_MINUTES),
        source_chunks: req.source_chunk_ids(),
    })
}

fn validate_item_set(
    draft: ItemSetDraft,
    req: &GenerationRequest<'_>,
    item_set_id: String,
    questions_per_set: usize,
) -> AppResult<ItemSet> {
    let vignette = draft.vignette.trim().to_string();
    if vignette.is_empty() {
        return Err(AppError::invalid_question("题组缺少 vignette"));
    }
    if draft.questions.len() < questions_per_set {
        return Err(AppError::invalid_question(format!(
            "题组需要 {} 道选择题，只返回了 {} 道",
            questions_per_set,
            draft.questions.len()
        )));
    }

    let mut questions = Vec::with_capacity(questions_per_set);
    for (i, mcq) in draft.questions.into_iter().take(questions_per_set).enumerate() {
        let question_text = mcq.question_text.trim().to_string();
        if question_text.is_empty() {
            return Err(AppError::invalid_question(format!("第 {} 道选择题没有题干", i + 1)));
        }
        let options = mcq.options.normalize();
        if options.len() < 2 {
            return Err(AppError::invalid_question(format!(
                "第 {} 道选择题选项不足",
                i + 1
            )));
        }
        let correct = normalize_letter(&mcq.correct_answer)
            .filter(|letter| options.contains_key(letter))
            .ok_or_else(|| {
                AppError::invalid_question(format!(
                    "第 {} 道选择题的答案 '{}' 不在选项中",
                    i + 1,
                    mcq.correct_answer
                ))
            })?;

        questions.push(MultipleChoice {
            question_number: i + 1,
            question_text,
            options,
            correct_answer: Some(correct),
            explanation: Some(mcq.explanation.trim().to_string()),
            points: MCQ_POINTS,
        });
    }

    Ok(ItemSet {
        item_set_id,
        topic: req.topic,
        difficulty: req.difficulty,
        total_points: questions.iter().map(|q| q.points).sum(),
        content_hash: content_hash(&vignette),
        vignette,
        questions,
        estimated_time_minutes: draft
            .estimated_time_minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_PM_MINUTES),
        source_chunks: req.source_chunk_ids(),
    })
}

// ========== 服务 ==========

/// 出题服务
///
/// 职责：
/// - 构造 prompt 并调用 [`ChatModel`]
/// - 把回复解析、校验成 [`ConstructedResponse`] / [`ItemSet`]
/// - 只出一道题，失败直接返回错误，不重试
pub struct QuestionGenerator {
    model: Arc<dyn ChatModel>,
    options: CompletionOptions,
}

impl QuestionGenerator {
    pub fn new(model: Arc<dyn ChatModel>, options: CompletionOptions) -> Self {
        Self { model, options }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// 上午场论述题
    pub async fn generate_constructed_response(
        &self,
        req: &GenerationRequest<'_>,
        question_id: String,
    ) -> AppResult<ConstructedResponse> {
        let prompt = constructed_response_prompt(req);
        debug!("[{}] 论述题 prompt {} 字符", question_id, prompt.len());

        let reply = self.model.complete(SYSTEM_PROMPT, &prompt, self.options).await?;
        let draft: ConstructedResponseDraft = parse_json_reply(&reply)?;
        validate_constructed_response(draft, req, question_id)
    }

    /// 下午场题组（题号从 1 开始，组卷时再统一编号）
    pub async fn generate_item_set(
        &self,
        req: &GenerationRequest<'_>,
        item_set_id: String,
    ) -> AppResult<ItemSet> {
        let per_set = Session::Pm.questions_per_set();
        let prompt = item_set_prompt(req, per_set);
        debug!("[{}] 题组 prompt {} 字符", item_set_id, prompt.len());

        let reply = self.model.complete(SYSTEM_PROMPT, &prompt, self.options).await?;
        let draft: ItemSetDraft = parse_json_reply(&reply)?;
        validate_item_set(draft, req, item_set_id, per_set)
    }
}
