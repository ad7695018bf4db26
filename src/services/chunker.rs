//! 文档分块服务 - 业务能力层
//!
//! 清洗 → 抽取章末练习题 → 切块 → 分类，产出 [`ProcessedDocument`]

use std::path::Path;

use regex::Regex;
use sha2::{Digest, Sha256};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::PdfExtractor;
use crate::models::chunk::{Chunk, Corpus, EocQuestion, ProcessedDocument};
use crate::services::classifier::TopicClassifier;

/// 章末练习题少于这个长度视为误匹配
const MIN_EOC_QUESTION_CHARS: usize = 50;

/// 内容指纹：SHA-256 的前 12 位十六进制
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(12);
    hex
}

/// 近似 token 数：按空白分隔的词数
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 统计 `text[start..end]` 中起始的词数
///
/// 一个词只计入它开头所在的区间，所以对一组首尾相接的区间求和等于全文词数
fn count_word_starts(text: &str, start: usize, end: usize) -> usize {
    let mut prev_is_space = text[..start]
        .chars()
        .next_back()
        .map_or(true, char::is_whitespace);
    let mut count = 0;
    for c in text[start..end].chars() {
        if c.is_whitespace() {
            prev_is_space = true;
        } else {
            if prev_is_space {
                count += 1;
            }
            prev_is_space = false;
        }
    }
    count
}

/// 文档分块器
///
/// 职责：
/// - 清洗提取出的文本（页码、非法字符、多余空白）
/// - 按固定字符窗口切块，窗口首尾相接覆盖全文
/// - 每块调用 [`TopicClassifier`] 打上主题
/// - 不调用 LLM
pub struct DocumentChunker {
    extractor: PdfExtractor,
    classifier: TopicClassifier,
    chunk_size: usize,
    page_line: Regex,
    page_marker: Regex,
    disallowed: Regex,
    whitespace: Regex,
    eoc_header: Regex,
    next_section: Regex,
    numbered_item: Regex,
}

fn compile(pattern: &str) -> AppResult<Regex> {
    Regex::new(pattern).map_err(|e| AppError::Other(format!("正则编译失败 {}: {}", pattern, e)))
}

impl DocumentChunker {
    pub fn new(chunk_size: usize) -> AppResult<Self> {
        Ok(Self {
            extractor: PdfExtractor::new(),
            classifier: TopicClassifier::new()?,
            chunk_size: chunk_size.max(1),
            page_line: compile(r"(?mi)^[ \t]*(?:page[ \t]+\d+(?:[ \t]+of[ \t]+\d+)?|\d+)[ \t]*$")?,
            page_marker: compile(r"\bPage \d+\b")?,
            disallowed: compile(r"[^\w\s.,;:!?()\[\]{}\-+=%$@#&*/\\]")?,
            whitespace: compile(r"\s+")?,
            eoc_header: compile(
                r"(?i)end of chapter questions|practice problems|review questions|problems and solutions|chapter \d+ problems",
            )?,
            next_section: compile(r"(?i)chapter \d+|section \d+")?,
            numbered_item: compile(r"\b(\d{1,3})\.\s")?,
        })
    }

    /// 清洗文本：去掉页码行和 `Page N` 标记，剔除非法字符，合并空白
    pub fn clean_text(&self, raw: &str) -> String {
        let text = self.page_line.replace_all(raw, "");
        let text = self.page_marker.replace_all(&text, "");
        let text = self.disallowed.replace_all(&text, "");
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }

    /// 把清洗后的文本切成首尾相接的区间 `(start, end)`
    pub fn split_spans(&self, text: &str) -> Vec<(usize, usize)> {
        if text.is_empty() {
            return Vec::new();
        }

        let splitter = TextSplitter::new(ChunkConfig::new(self.chunk_size).with_trim(false));
        let mut starts: Vec<usize> = splitter.chunk_indices(text).map(|(offset, _)| offset).collect();
        if starts.is_empty() {
            return vec![(0, text.len())];
        }
        starts[0] = 0;
        starts.dedup();

        let mut spans = Vec::with_capacity(starts.len());
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            spans.push((start, end));
        }
        spans
    }

    /// 对清洗后的文本切块并分类
    pub fn chunk_text(&self, source_file: &str, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (start, end) in self.split_spans(text) {
            let content = text[start..end].trim();
            if content.is_empty() {
                continue;
            }
            chunks.push(Chunk {
                chunk_id: format!("{}_{}", source_file, chunks.len()),
                content: content.to_string(),
                topic: self.classifier.classify(content),
                source_file: source_file.to_string(),
                token_count: count_word_starts(text, start, end),
                start,
                end,
                content_hash: content_hash(content),
            });
        }
        chunks
    }

    /// 抽取章末练习题
    pub fn extract_eoc_questions(&self, source_file: &str, text: &str) -> Vec<EocQuestion> {
        let mut questions = Vec::new();

        for header in self.eoc_header.find_iter(text) {
            let rest = &text[header.end()..];
            let section_end = self
                .next_section
                .find(rest)
                .map_or(rest.len(), |m| m.start());
            let section = &rest[..section_end];

            let items: Vec<_> = self.numbered_item.captures_iter(section).collect();
            for (i, caps) in items.iter().enumerate() {
                let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let content_end = items
                    .get(i + 1)
                    .and_then(|next| next.get(0))
                    .map_or(section.len(), |m| m.start());
                let content = section[whole.end()..content_end].trim();
                if content.chars().count() > MIN_EOC_QUESTION_CHARS {
                    questions.push(EocQuestion {
                        number: number.as_str().to_string(),
                        content: content.to_string(),
                        source_file: source_file.to_string(),
                    });
                }
            }
        }

        questions
    }

    /// 处理一段原始文本（不读文件）
    pub fn process_text(&self, source_file: &str, raw: &str) -> ProcessedDocument {
        let clean = self.clean_text(raw);
        let eoc_questions = self.extract_eoc_questions(source_file, &clean);
        let chunks = self.chunk_text(source_file, &clean);

        ProcessedDocument {
            source_file: source_file.to_string(),
            total_tokens: count_tokens(&clean),
            chunks,
            eoc_questions,
        }
    }

    /// 处理单个文件
    pub fn process_document(&self, path: &Path) -> AppResult<ProcessedDocument> {
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        info!("📄 正在处理: {}", source_file);
        let raw = self.extractor.extract_text(path)?;
        let doc = self.process_text(&source_file, &raw);
        debug!(
            "[{}] {} 个文本块, {} 道章末题, {} tokens",
            source_file,
            doc.chunks.len(),
            doc.eoc_questions.len(),
            doc.total_tokens
        );
        Ok(doc)
    }

    /// 处理多个文件，单个文件失败只记录警告
    pub fn process_files(&self, paths: &[impl AsRef<Path>]) -> Corpus {
        let mut corpus = Corpus::default();

        for path in paths {
            let path = path.as_ref();
            match self.process_document(path) {
                Ok(doc) => {
                    info!("✓ {}: {} 个文本块", doc.source_file, doc.chunks.len());
                    corpus.absorb(doc);
                }
                Err(e) => {
                    warn!("⚠️ 跳过 {}: {}", path.display(), e);
                }
            }
        }

        corpus
    }
}
