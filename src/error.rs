use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// PDF / 文本提取错误
    #[error("PDF错误: {0}")]
    Pdf(#[from] PdfError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 考试业务错误
    #[error("业务错误: {0}")]
    Exam(#[from] ExamError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// PDF 与文本提取错误
#[derive(Debug, Error)]
pub enum PdfError {
    /// 文件不是 PDF 或已损坏
    #[error("无法解析文档 ({path}): {message}")]
    Malformed { path: String, message: String },
    /// 提取后没有任何文本
    #[error("文档中没有可提取的文本: {path}")]
    EmptyText { path: String },
    /// 不支持的文件类型
    #[error("不支持的文件类型: {path}")]
    UnsupportedFormat { path: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: BoxedSource,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容不是合法 JSON
    #[error("无法解析LLM返回的JSON: {source} (响应: {response})")]
    JsonParseFailed {
        response: String,
        #[source]
        source: serde_json::Error,
    },
    /// JSON 合法但题目结构不完整
    #[error("LLM返回的题目结构无效: {reason}")]
    InvalidQuestion { reason: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: BoxedSource,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: BoxedSource,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: BoxedSource,
    },
    /// JSON 解析失败
    #[error("JSON解析失败 ({path}): {source}")]
    JsonParseFailed {
        path: String,
        #[source]
        source: BoxedSource,
    },
}

/// 考试业务错误
#[derive(Debug, Error)]
pub enum ExamError {
    /// 没有可用的教材内容
    #[error("没有可用的教材内容，请先导入 PDF")]
    NoContent,
    /// 一道题都没有生成出来
    #[error("{session} 考试没有生成任何题目")]
    EmptyExam { session: String },
    /// 提交与考试不匹配
    #[error("提交的答卷不属于该考试 (考试: {exam_id}, 答卷: {submission_exam_id})")]
    SubmissionMismatch {
        exam_id: String,
        submission_exam_id: String,
    },
    /// 场次不匹配
    #[error("场次不匹配: 期望 {expected}, 实际 {actual}")]
    SessionMismatch { expected: String, actual: String },
    /// 考试已经提交
    #[error("考试已经提交: {session_id}")]
    AlreadySubmitted { session_id: String },
    /// 场次解析失败
    #[error("无法解析场次: {value} (应为 AM 或 PM)")]
    SessionParseFailed { value: String },
    /// 评分用的试卷不含答案（拿到的是考生版）
    #[error("试卷 {exam_id} 缺少答案，请使用 _solutions.json")]
    MissingAnswerKey { exam_id: String },
    /// 找不到考试会话
    #[error("找不到考试会话: {session_id}")]
    SessionNotFound { session_id: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    /// 主题权重配置无效
    #[error("主题权重配置无效 ({topic}): {reason}")]
    InvalidTopicWeight { topic: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建题目结构错误
    pub fn invalid_question(reason: impl Into<String>) -> Self {
        AppError::Llm(LlmError::InvalidQuestion {
            reason: reason.into(),
        })
    }

    /// 是否是缺少配置导致的错误（出题流程遇到时直接中止，命令行据此只给出提示）
    pub fn is_missing_config(&self) -> bool {
        matches!(self, AppError::Config(ConfigError::EnvVarNotFound { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_category_and_detail() {
        let err = AppError::from(ConfigError::EnvVarNotFound {
            var_name: "OPENAI_API_KEY".to_string(),
        });
        let text = err.to_string();
        assert!(text.starts_with("配置错误"));
        assert!(text.contains("OPENAI_API_KEY"));
        assert!(err.is_missing_config());
    }

    #[test]
    fn test_source_chain_is_preserved() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = AppError::file_write_failed("exams/x.json", io);
        let file_err = err.source().expect("应该有 FileError");
        assert!(file_err.source().is_some());
        assert!(!err.is_missing_config());
    }
}
