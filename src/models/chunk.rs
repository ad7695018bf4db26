use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::topic::Topic;

/// 教材文本块
///
/// 导入时生成，之后只读。`start..end` 是在清洗后文本中的字节区间。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub content: String,
    pub topic: Topic,
    pub source_file: String,
    pub token_count: usize,
    pub start: usize,
    pub end: usize,
    pub content_hash: String,
}

/// 章末练习题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EocQuestion {
    pub number: String,
    pub content: String,
    pub source_file: String,
}

/// 单个文档的处理结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub source_file: String,
    pub chunks: Vec<Chunk>,
    pub eoc_questions: Vec<EocQuestion>,
    pub total_tokens: usize,
}

/// 全部教材的导入结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub processed_files: Vec<String>,
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub eoc_questions: Vec<EocQuestion>,
    pub topic_distribution: BTreeMap<Topic, usize>,
    pub total_tokens: usize,
}

impl Corpus {
    /// 合并一个文档
    pub fn absorb(&mut self, doc: ProcessedDocument) {
        for chunk in &doc.chunks {
            *self.topic_distribution.entry(chunk.topic).or_insert(0) += 1;
        }
        self.total_tokens += doc.total_tokens;
        self.processed_files.push(doc.source_file);
        self.chunks.extend(doc.chunks);
        self.eoc_questions.extend(doc.eoc_questions);
    }

    /// 按主题分组
    pub fn chunks_by_topic(&self) -> BTreeMap<Topic, Vec<&Chunk>> {
        let mut grouped: BTreeMap<Topic, Vec<&Chunk>> = BTreeMap::new();
        for chunk in &self.chunks {
            grouped.entry(chunk.topic).or_default().push(chunk);
        }
        grouped
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
