pub mod chunker;
pub mod classifier;
pub mod exam_builder;
pub mod grading;
pub mod question_generator;
pub mod report;
pub mod timer;

pub use chunker::DocumentChunker;
pub use classifier::TopicClassifier;
pub use exam_builder::{ExamBuilder, GeneratedQuestions};
pub use grading::{grade_am, grade_pm, rubric_sheet, RubricItem};
pub use question_generator::{GenerationRequest, QuestionGenerator};
pub use report::performance_report;
pub use timer::ExamClock;
