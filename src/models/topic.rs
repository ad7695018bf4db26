use phf::phf_map;
use serde::{Deserialize, Serialize};

/// CFA Level III 主题枚举
///
/// 声明顺序即规范顺序：分类打平、权重分配打平时都按这个顺序取前者。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "Asset Allocation")]
    AssetAllocation,
    #[serde(rename = "Portfolio Construction")]
    PortfolioConstruction,
    #[serde(rename = "Performance Management")]
    PerformanceManagement,
    #[serde(rename = "Derivatives & Risk Management")]
    DerivativesRiskManagement,
    #[serde(rename = "Ethics & Professional Standards")]
    EthicsProfessionalStandards,
    #[serde(rename = "Portfolio Management Pathway")]
    PortfolioManagementPathway,
}

/// 别名表（小写），兼容旧版五主题命名和 LLM 返回的各种写法
static TOPIC_ALIASES: phf::Map<&'static str, Topic> = phf_map! {
    "asset allocation" => Topic::AssetAllocation,
    "portfolio construction" => Topic::PortfolioConstruction,
    "performance management" => Topic::PerformanceManagement,
    "performance measurement" => Topic::PerformanceManagement,
    "derivatives & risk management" => Topic::DerivativesRiskManagement,
    "derivatives and risk management" => Topic::DerivativesRiskManagement,
    "risk management" => Topic::DerivativesRiskManagement,
    "derivatives" => Topic::DerivativesRiskManagement,
    "ethics & professional standards" => Topic::EthicsProfessionalStandards,
    "ethics and professional standards" => Topic::EthicsProfessionalStandards,
    "ethics" => Topic::EthicsProfessionalStandards,
    "portfolio management pathway" => Topic::PortfolioManagementPathway,
    "portfolio management" => Topic::PortfolioManagementPathway,
    "private wealth" => Topic::PortfolioManagementPathway,
};

impl Topic {
    /// 全部主题（规范顺序）
    pub const ALL: [Topic; 6] = [
        Topic::AssetAllocation,
        Topic::PortfolioConstruction,
        Topic::PerformanceManagement,
        Topic::DerivativesRiskManagement,
        Topic::EthicsProfessionalStandards,
        Topic::PortfolioManagementPathway,
    ];

    /// 关键词一个都没命中时使用的主题（考纲占比最大）
    pub const FALLBACK: Topic = Topic::PortfolioManagementPathway;

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Topic::AssetAllocation => "Asset Allocation",
            Topic::PortfolioConstruction => "Portfolio Construction",
            Topic::PerformanceManagement => "Performance Management",
            Topic::DerivativesRiskManagement => "Derivatives & Risk Management",
            Topic::EthicsProfessionalStandards => "Ethics & Professional Standards",
            Topic::PortfolioManagementPathway => "Portfolio Management Pathway",
        }
    }

    /// 分类关键词
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Topic::AssetAllocation => &[
                "asset allocation", "strategic allocation", "tactical allocation",
                "mean-variance optimization", "efficient frontier", "risk budgeting",
                "liability-driven investing", "ALM", "asset-liability matching", "rebalancing",
                "portfolio optimization", "capital market expectations", "monte carlo simulation",
            ],
            Topic::PortfolioConstruction => &[
                "portfolio construction", "factor investing", "smart beta",
                "alternative investments", "private equity", "hedge funds", "real estate",
                "commodities", "currency management", "overlay strategies",
                "completion portfolios", "core-satellite", "barbell strategy",
            ],
            Topic::PerformanceManagement => &[
                "performance measurement", "performance attribution", "GIPS", "benchmarking",
                "risk-adjusted returns", "sharpe ratio", "information ratio", "tracking error",
                "alpha", "beta", "performance evaluation", "attribution analysis",
                "appraisal ratio",
            ],
            Topic::DerivativesRiskManagement => &[
                "derivatives", "options", "futures", "swaps", "forwards", "risk management",
                "hedging", "VaR", "value at risk", "credit risk", "market risk",
                "operational risk", "stress testing", "scenario analysis", "tail risk",
                "downside protection",
            ],
            Topic::EthicsProfessionalStandards => &[
                "ethics", "professional standards", "code of ethics",
                "standards of professional conduct", "fiduciary duty", "conflicts of interest",
                "material nonpublic information", "fair dealing", "suitability",
                "performance presentation", "compliance", "investment management process",
            ],
            Topic::PortfolioManagementPathway => &[
                "institutional portfolio management", "individual portfolio management",
                "wealth management", "pension funds", "endowments", "foundations",
                "insurance companies", "banks", "sovereign wealth funds", "family offices",
                "high net worth", "retirement planning", "estate planning",
                "tax considerations", "behavioral finance", "client management",
            ],
        }
    }

    /// 精确匹配标准名称（忽略大小写）或已知别名
    pub fn parse(s: &str) -> Option<Self> {
        let key = s.trim().to_lowercase();
        TOPIC_ALIASES.get(key.as_str()).copied()
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_and_alias() {
        for topic in Topic::ALL {
            assert_eq!(Topic::parse(topic.name()), Some(topic));
        }
        assert_eq!(Topic::parse("risk management"), Some(Topic::DerivativesRiskManagement));
        assert_eq!(Topic::parse("  Portfolio Management "), Some(Topic::PortfolioManagementPathway));
        assert_eq!(Topic::parse("General"), None);
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&Topic::EthicsProfessionalStandards).unwrap();
        assert_eq!(json, "\"Ethics & Professional Standards\"");
        let back: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Topic::EthicsProfessionalStandards);
    }
}
