pub mod pdf_extractor;
pub mod storage;

pub use pdf_extractor::PdfExtractor;
pub use storage::Storage;
