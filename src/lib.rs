//! # CFA Mock Exam
//!
//! 从 CFA 三级教材 PDF 生成模拟考试，并负责计时和评分
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 持有文件资源，只暴露能力
//! - `PdfExtractor` - 把 PDF / TXT 变成纯文本
//! - `Storage` - 唯一的文件布局 owner，按名字读写 JSON
//! - `clients/` - `ChatModel` 抽象与 OpenAI 兼容实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `DocumentChunker` / `TopicClassifier` - 清洗、分块、主题分类
//! - `QuestionGenerator` - 论述题 / 案例题组生成与校验
//! - `ExamBuilder` - 题量分配、抽样、组卷
//! - `grading` / `ExamClock` / `report` - 评分、计时、成绩报告
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一场考试"的出题流程
//! - `GenerationCtx` - 上下文封装（场次 + 槽位 + 主题 + 难度）
//! - `GenerationFlow` - 流程编排（抽样 → LLM → 校验 → 重试 → 组卷）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator::App` - 命令调度、持久化与统计
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ChatModel, CompletionOptions, OpenAiChat};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{PdfExtractor, Storage};
pub use models::{Exam, Session, Submission, Topic};
pub use orchestrator::{App, BuildOptions};
pub use workflow::{GenerationCtx, GenerationFlow};
