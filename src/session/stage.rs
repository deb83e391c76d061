//! Wizard stages: the linear positions a session moves through.

use serde::{Deserialize, Serialize};

/// A named position in the wizard sequence.
///
/// Progresses linearly: Entry → Intermediate1 → Intermediate2 → Terminal.
/// The derived ordering follows that progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "entry")]
    Entry,
    #[serde(rename = "intermediate-1")]
    Intermediate1,
    #[serde(rename = "intermediate-2")]
    Intermediate2,
    #[serde(rename = "terminal")]
    Terminal,
}

impl Stage {
    /// Every stage in progression order.
    pub const ALL: [Stage; 4] = [
        Stage::Entry,
        Stage::Intermediate1,
        Stage::Intermediate2,
        Stage::Terminal,
    ];

    /// Wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Intermediate1 => "intermediate-1",
            Self::Intermediate2 => "intermediate-2",
            Self::Terminal => "terminal",
        }
    }

    /// Route path this stage is served on.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Entry => "/start",
            Self::Intermediate1 => "/preparing",
            Self::Intermediate2 => "/details",
            Self::Terminal => "/complete",
        }
    }

    /// Whether this is the last stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Entry
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}
