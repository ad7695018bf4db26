//! 出题上下文
//!
//! 封装"我正在为哪一场考试生成第几道题"这一信息

use std::fmt::Display;

use crate::models::session::{Difficulty, Session};
use crate::models::topic::Topic;

/// 出题上下文
#[derive(Debug, Clone)]
pub struct GenerationCtx {
    /// 场次
    pub session: Session,

    /// 槽位序号（从1开始，仅用于日志和临时 ID）
    pub slot_index: usize,

    /// 本场槽位总数
    pub total_slots: usize,

    /// 本槽位的主题
    pub topic: Topic,

    /// 本槽位的难度
    pub difficulty: Difficulty,
}

impl GenerationCtx {
    pub fn new(
        session: Session,
        slot_index: usize,
        total_slots: usize,
        topic: Topic,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            session,
            slot_index,
            total_slots,
            topic,
            difficulty,
        }
    }

    /// 组卷前的临时 ID，组卷时会按最终顺序重新编号
    pub fn provisional_id(&self) -> String {
        match self.session {
            Session::Am => format!("AM_SLOT{}", self.slot_index),
            Session::Pm => format!("PM_SLOT{}", self.slot_index),
        }
    }
}

impl Display for GenerationCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} 题目#{}/{} {}]",
            self.session, self.slot_index, self.total_slots, self.topic
        )
    }
}
