//! 本地存储 - 基础设施层
//!
//! 持有固定的目录布局，只暴露"按名字读写 JSON"的能力：
//!
//! ```text
//! data/processed/        导入后的教材文本块
//! data/exam_sessions/    考试会话、已用内容指纹
//! exams/                 试卷（考生版 / 含答案版 / 答题卡）
//! exams/submissions/     答卷
//! exams/results/         评分结果与成绩报告
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult, FileError};
use crate::models::session::Session;

const CORPUS_FILE: &str = "financial_books_content.json";
const USED_CONTENT_FILE: &str = "used_questions.json";

/// 已用内容指纹（避免跨考试重复出题）
#[derive(Debug, Default, Serialize, Deserialize)]
struct UsedContent {
    used_hashes: BTreeSet<String>,
}

/// 本地存储
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
    exams_dir: PathBuf,
}

impl Storage {
    pub fn new(data_dir: impl Into<PathBuf>, exams_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            exams_dir: exams_dir.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.data_dir, &config.exams_dir)
    }

    /// 创建全部目录
    pub fn ensure_layout(&self) -> AppResult<()> {
        for dir in [
            self.processed_dir(),
            self.sessions_dir(),
            self.exams_dir.clone(),
            self.submissions_dir(),
            self.results_dir(),
        ] {
            fs::create_dir_all(&dir)
                .map_err(|e| AppError::file_write_failed(dir.display().to_string(), e))?;
        }
        Ok(())
    }

    // ========== 路径 ==========

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("exam_sessions")
    }

    pub fn submissions_dir(&self) -> PathBuf {
        self.exams_dir.join("submissions")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.exams_dir.join("results")
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.processed_dir().join(CORPUS_FILE)
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", session_id))
    }

    pub fn exam_path(&self, exam_id: &str) -> PathBuf {
        self.exams_dir.join(format!("{}_exam.json", exam_id))
    }

    pub fn solutions_path(&self, exam_id: &str) -> PathBuf {
        self.exams_dir.join(format!("{}_solutions.json", exam_id))
    }

    pub fn answer_sheet_path(&self, exam_id: &str) -> PathBuf {
        self.exams_dir.join(format!("{}_answer_sheet.json", exam_id))
    }

    /// 同一秒内重复出题时给试卷 ID 追加 `_2`、`_3` …，不覆盖已有试卷
    pub fn available_exam_id(&self, base: &str) -> String {
        let mut exam_id = base.to_string();
        let mut n = 1;
        while self.exam_path(&exam_id).exists() || self.solutions_path(&exam_id).exists() {
            n += 1;
            exam_id = format!("{}_{}", base, n);
        }
        exam_id
    }

    pub fn new_submission_path(&self, exam_id: &str, session: Session) -> PathBuf {
        let base = format!(
            "{}_{}_submission_{}",
            exam_id,
            session.code(),
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let dir = self.submissions_dir();
        let mut path = dir.join(format!("{}.json", base));
        let mut n = 1;
        while path.exists() {
            n += 1;
            path = dir.join(format!("{}_{}.json", base, n));
        }
        path
    }

    /// 返回 (结果 JSON 路径, 成绩报告路径)，已存在时追加序号
    pub fn new_result_paths(&self, exam_id: &str, session: Session) -> (PathBuf, PathBuf) {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let base = format!("{}_{}_results_{}", exam_id, session.code(), stamp);
        let dir = self.results_dir();
        let mut name = base.clone();
        let mut n = 1;
        loop {
            let json = dir.join(format!("{}.json", name));
            let report = dir.join(format!("{}_report.txt", name));
            if !json.exists() && !report.exists() {
                return (json, report);
            }
            n += 1;
            name = format!("{}_{}", base, n);
        }
    }

    // ========== 读写 ==========

    /// 写入 JSON（自动创建父目录）
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> AppResult<()> {
        let path_str = path.display().to_string();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::file_write_failed(path_str.clone(), e))?;
        }
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| AppError::file_write_failed(path_str.clone(), e))?;
        fs::write(path, json).map_err(|e| AppError::file_write_failed(path_str.clone(), e))?;
        debug!("已写入: {}", path_str);
        Ok(())
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> AppResult<T> {
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(FileError::NotFound { path: path_str }.into());
        }
        let content =
            fs::read_to_string(path).map_err(|e| AppError::file_read_failed(path_str.clone(), e))?;
        serde_json::from_str(&content).map_err(|e| {
            FileError::JsonParseFailed {
                path: path_str,
                source: Box::new(e),
            }
            .into()
        })
    }

    /// 写入纯文本
    pub fn write_text(&self, path: &Path, text: &str) -> AppResult<()> {
        let path_str = path.display().to_string();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::file_write_failed(path_str.clone(), e))?;
        }
        fs::write(path, text).map_err(|e| AppError::file_write_failed(path_str, e))
    }

    // ========== 已用内容指纹 ==========

    /// 读取已用内容指纹，文件不存在时返回空集合
    pub fn load_used_hashes(&self) -> AppResult<BTreeSet<String>> {
        let path = self.sessions_dir().join(USED_CONTENT_FILE);
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        let used: UsedContent = self.read_json(&path)?;
        Ok(used.used_hashes)
    }

    /// 追加已用内容指纹
    pub fn record_used_hashes(&self, hashes: impl IntoIterator<Item = String>) -> AppResult<()> {
        let mut used_hashes = self.load_used_hashes()?;
        used_hashes.extend(hashes);
        let path = self.sessions_dir().join(USED_CONTENT_FILE);
        self.write_json(&path, &UsedContent { used_hashes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("data"), dir.path().join("exams"));
        storage.ensure_layout().unwrap();

        assert!(dir.path().join("data/processed").is_dir());
        assert!(dir.path().join("data/exam_sessions").is_dir());
        assert!(dir.path().join("exams/results").is_dir());
        assert!(dir.path().join("exams/submissions").is_dir());
    }

    #[test]
    fn test_used_hashes_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("data"), dir.path().join("exams"));

        assert!(storage.load_used_hashes().unwrap().is_empty());
        storage
            .record_used_hashes(vec!["aaa".to_string(), "bbb".to_string()])
            .unwrap();
        storage.record_used_hashes(vec!["bbb".to_string(), "ccc".to_string()]).unwrap();

        let used = storage.load_used_hashes().unwrap();
        assert_eq!(used.len(), 3);
        assert!(used.contains("ccc"));
    }

    #[test]
    fn test_read_missing_and_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("data"), dir.path().join("exams"));
        let path = dir.path().join("broken.json");

        let missing: AppResult<UsedContent> = storage.read_json(&path);
        assert!(matches!(missing, Err(AppError::File(FileError::NotFound { .. }))));

        fs::write(&path, "{ not json").unwrap();
        let corrupt: AppResult<UsedContent> = storage.read_json(&path);
        assert!(matches!(
            corrupt,
            Err(AppError::File(FileError::JsonParseFailed { .. }))
        ));
    }

    #[test]
    fn test_read_failure_keeps_path() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("data"), dir.path().join("exams"));
        storage.ensure_layout().unwrap();

        // 目录存在但不是文件
        let target = storage.results_dir();
        let err = storage.read_json::<UsedContent>(&target).unwrap_err();
        match err {
            AppError::File(FileError::ReadFailed { path, .. }) => {
                assert_eq!(path, target.display().to_string());
            }
            other => panic!("expected ReadFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_output_paths_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("data"), dir.path().join("exams"));
        storage.ensure_layout().unwrap();

        let first = storage.new_submission_path("CFA_L3_PM_X", Session::Pm);
        storage.write_text(&first, "{}").unwrap();
        let second = storage.new_submission_path("CFA_L3_PM_X", Session::Pm);
        assert_ne!(first, second);

        let (json, report) = storage.new_result_paths("CFA_L3_PM_X", Session::Pm);
        storage.write_text(&report, "report").unwrap();
        let (json2, report2) = storage.new_result_paths("CFA_L3_PM_X", Session::Pm);
        assert_ne!(json, json2);
        assert_ne!(report, report2);

        assert_eq!(storage.available_exam_id("CFA_L3_AM_X"), "CFA_L3_AM_X");
        storage
            .write_text(&storage.solutions_path("CFA_L3_AM_X"), "{}")
            .unwrap();
        assert_eq!(storage.available_exam_id("CFA_L3_AM_X"), "CFA_L3_AM_X_2");
    }
}
