//! 考试计时 - 业务能力层

use chrono::{DateTime, Duration, Local};

use crate::models::exam::ExamSession;

/// 考试时钟
///
/// 所有方法都接收 `now`，便于测试和在交卷时统一时间点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamClock {
    started_at: DateTime<Local>,
    duration: Duration,
}

impl ExamClock {
    pub fn new(started_at: DateTime<Local>, minutes: u32) -> Self {
        Self {
            started_at,
            duration: Duration::minutes(i64::from(minutes)),
        }
    }

    pub fn for_session(session: &ExamSession) -> Self {
        Self::new(session.started_at, session.duration_minutes)
    }

    pub fn deadline(&self) -> DateTime<Local> {
        self.started_at + self.duration
    }

    /// 剩余时间，不会小于 0
    pub fn remaining(&self, now: DateTime<Local>) -> Duration {
        (self.deadline() - now).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        now >= self.deadline()
    }

    /// 已用时间占比，范围 `[0, 1]`
    pub fn elapsed_fraction(&self, now: DateTime<Local>) -> f64 {
        let total = self.duration.num_milliseconds();
        if total <= 0 {
            return 1.0;
        }
        let elapsed = (now - self.started_at).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// `HH:MM:SS`
    pub fn format_remaining(&self, now: DateTime<Local>) -> String {
        let secs = self.remaining(now).num_seconds();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }

    /// 交卷时间：超时后按截止时间记录，并标记为自动交卷
    pub fn submission_time(&self, now: DateTime<Local>) -> (DateTime<Local>, bool) {
        if self.is_expired(now) {
            (self.deadline(), true)
        } else {
            (now, false)
        }
    }
}
