pub mod chunk;
pub mod exam;
pub mod loaders;
pub mod question;
pub mod session;
pub mod submission;
pub mod topic;
pub mod weights;

pub use chunk::{Chunk, Corpus, EocQuestion, ProcessedDocument};
pub use exam::{AnswerSheet, Exam};
pub use loaders::load_topic_weights;
pub use question::{ConstructedResponse, ExamQuestions, ItemSet, MultipleChoice};
pub use session::{Difficulty, Session};
pub use submission::{Answers, GradingResult, SelfScores, Submission};
pub use topic::Topic;
pub use weights::{TopicWeight, TopicWeights};
