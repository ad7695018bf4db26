//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责命令调度和持久化，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::App (ingest / build / start / submit / grade)
//!     ↓
//! workflow::GenerationFlow (一场考试 / 一个出题槽位)
//!     ↓
//! services (能力层：chunker / generator / builder / grading / timer / report)
//!     ↓
//! clients + infrastructure (ChatModel / PdfExtractor / Storage)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有 Storage 和对话模型
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度、持久化和统计

pub mod app;

pub use app::{is_missing_config, App, BuildOptions, GradeOutput, SessionStatus};
