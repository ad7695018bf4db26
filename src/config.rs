use std::path::PathBuf;

use crate::error::{AppResult, ConfigError};

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 出题时的采样温度
    pub llm_temperature: f32,
    /// 单次出题的最大 token
    pub llm_max_tokens: u32,
    // --- 目录布局 ---
    /// 数据目录（processed / exam_sessions）
    pub data_dir: PathBuf,
    /// 考试目录（results / submissions）
    pub exams_dir: PathBuf,
    /// 教材 PDF 目录
    pub books_dir: PathBuf,
    /// 主题权重 TOML 文件
    pub topics_file: PathBuf,
    // --- 处理参数 ---
    /// 每个文本块的最大字符数
    pub chunk_size: usize,
    /// 每道题最多尝试生成的次数
    pub max_generation_attempts: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4-turbo-preview".to_string(),
            llm_temperature: 0.7,
            llm_max_tokens: 2000,
            data_dir: PathBuf::from("data"),
            exams_dir: PathBuf::from("exams"),
            books_dir: PathBuf::from("financial books"),
            topics_file: PathBuf::from("config/topics.toml"),
            chunk_size: 500,
            max_generation_attempts: 3,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置（先读取 `.env`）
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let default = Self::default();
        Self {
            llm_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("OPENAI_API_BASE").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("OPENAI_MODEL").unwrap_or(default.llm_model_name),
            llm_temperature: std::env::var("OPENAI_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_temperature),
            llm_max_tokens: std::env::var("OPENAI_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            data_dir: std::env::var("CFA_DATA_DIR").map(PathBuf::from).unwrap_or(default.data_dir),
            exams_dir: std::env::var("CFA_EXAMS_DIR").map(PathBuf::from).unwrap_or(default.exams_dir),
            books_dir: std::env::var("CFA_BOOKS_DIR").map(PathBuf::from).unwrap_or(default.books_dir),
            topics_file: std::env::var("CFA_TOPICS_FILE").map(PathBuf::from).unwrap_or(default.topics_file),
            chunk_size: std::env::var("CHUNK_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.chunk_size),
            max_generation_attempts: std::env::var("MAX_GENERATION_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_generation_attempts),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 调用 LLM 之前检查 API key
    pub fn validate_llm(&self) -> AppResult<()> {
        if self.llm_api_key.trim().is_empty() {
            return Err(ConfigError::EnvVarNotFound {
                var_name: "OPENAI_API_KEY".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
