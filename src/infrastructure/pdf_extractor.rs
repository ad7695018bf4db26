//! 文档提取器 - 基础设施层
//!
//! 只暴露"把文件变成纯文本"的能力，不关心分块和分类

use std::path::Path;

use tracing::debug;

use crate::error::{AppError, AppResult, PdfError};

/// 文档提取器
///
/// 职责：
/// - PDF 使用 `pdf-extract` 提取文本
/// - `.txt` 直接读取（预先转换好的教材文本）
/// - 不认识 Chunk / Topic
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 是否是支持的文件类型
    pub fn supports(path: &Path) -> bool {
        matches!(
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .as_deref(),
            Some("pdf") | Some("txt")
        )
    }

    /// 提取文件的全部文本
    pub fn extract_text(&self, path: &Path) -> AppResult<String> {
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(crate::error::FileError::NotFound { path: path_str }.into());
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let text = match ext.as_deref() {
            Some("pdf") => {
                let bytes = std::fs::read(path)
                    .map_err(|e| AppError::file_read_failed(path_str.clone(), e))?;
                self.extract_pdf_bytes(&bytes, &path_str)?
            }
            Some("txt") => std::fs::read_to_string(path)
                .map_err(|e| AppError::file_read_failed(path_str.clone(), e))?,
            _ => return Err(PdfError::UnsupportedFormat { path: path_str }.into()),
        };

        if text.trim().is_empty() {
            return Err(PdfError::EmptyText { path: path_str }.into());
        }

        debug!("提取完成: {} ({} 字符)", path_str, text.chars().count());
        Ok(text)
    }

    /// 从内存中的 PDF 提取文本（上传场景）
    pub fn extract_pdf_bytes(&self, bytes: &[u8], name: &str) -> AppResult<String> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            PdfError::Malformed {
                path: name.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_invalid_pdf_is_malformed() {
        let extractor = PdfExtractor::new();
        let err = extractor
            .extract_pdf_bytes(b"This is not a PDF", "fake.pdf")
            .unwrap_err();
        assert!(matches!(err, AppError::Pdf(PdfError::Malformed { .. })));
    }

    #[test]
    fn test_txt_is_read_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Strategic asset allocation sets long-term weights.").unwrap();

        let text = PdfExtractor::new().extract_text(&path).unwrap();
        assert!(text.contains("Strategic asset allocation"));
    }

    #[test]
    fn test_unsupported_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("book.docx");
        std::fs::write(&docx, "x").unwrap();

        let extractor = PdfExtractor::new();
        assert!(matches!(
            extractor.extract_text(&docx).unwrap_err(),
            AppError::Pdf(PdfError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            extractor.extract_text(&dir.path().join("missing.pdf")).unwrap_err(),
            AppError::File(_)
        ));
        assert!(PdfExtractor::supports(Path::new("a/B.PDF")));
        assert!(!PdfExtractor::supports(Path::new("a/b.docx")));
    }

    #[test]
    fn test_blank_text_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        std::fs::write(&path, "   \n\n").unwrap();
        assert!(matches!(
            PdfExtractor::new().extract_text(&path).unwrap_err(),
            AppError::Pdf(PdfError::EmptyText { .. })
        ));
    }
}
