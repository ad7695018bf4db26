use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExamError;

/// 考试场次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    /// 上午场：主观论述题
    #[serde(rename = "AM")]
    Am,
    /// 下午场：案例选择题组
    #[serde(rename = "PM")]
    Pm,
}

impl Session {
    pub fn code(self) -> &'static str {
        match self {
            Session::Am => "AM",
            Session::Pm => "PM",
        }
    }

    /// 场次时长（分钟）
    pub fn time_minutes(self) -> u32 {
        180
    }

    /// 题目数量区间（AM 为论述题道数，PM 为题组数）
    pub fn question_count_range(self) -> RangeInclusive<usize> {
        match self {
            Session::Am => 3..=5,
            Session::Pm => 4..=6,
        }
    }

    /// 每个题组包含的选择题数量
    pub fn questions_per_set(self) -> usize {
        3
    }

    pub fn instructions(self) -> Vec<String> {
        let lines: &[&str] = match self {
            Session::Am => &[
                "This is the Morning Session of the CFA Level III examination.",
                "You have 3 hours (180 minutes) to complete this session.",
                "This session consists of constructed response questions.",
                "Show all calculations and provide clear explanations.",
                "Use bullet points where appropriate in your responses.",
                "Manage your time carefully - aim to spend the suggested time per question.",
            ],
            Session::Pm => &[
                "This is the Afternoon Session of the CFA Level III examination.",
                "You have 3 hours (180 minutes) to complete this session.",
                "This session consists of item sets with multiple choice questions.",
                "Read each vignette carefully before answering the questions.",
                "Select the best answer for each question.",
                "There is no penalty for guessing.",
            ],
        };
        lines.iter().map(|l| l.to_string()).collect()
    }
}

impl FromStr for Session {
    type Err = ExamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AM" | "MORNING" => Ok(Session::Am),
            "PM" | "AFTERNOON" => Ok(Session::Pm),
            _ => Err(ExamError::SessionParseFailed {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// 难度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(rename = "Level_1")]
    Level1,
    #[serde(rename = "Level_2")]
    Level2,
    #[serde(rename = "Level_3")]
    Level3,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Level1, Difficulty::Level2, Difficulty::Level3];

    /// 抽样权重
    pub fn weight(self) -> f64 {
        match self {
            Difficulty::Level1 => 0.2,
            Difficulty::Level2 => 0.5,
            Difficulty::Level3 => 0.3,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Difficulty::Level1 => "Basic recall and understanding",
            Difficulty::Level2 => "Application and analysis",
            Difficulty::Level3 => "Synthesis and evaluation",
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Level2
    }
}
