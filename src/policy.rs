use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// 2本のフォークをどの順番で取るか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquirePolicy {
    /// 全員が左 → 右。全員が左を持つとデッドロックする
    LeftFirst,
    /// 番号が最大の哲学者だけ右 → 左
    #[default]
    LastReversed,
    /// 偶数番は左 → 右、奇数番は右 → 左
    Alternating,
    /// 左を取ってから右を試し、取れなければ左を置いて少し待ってやり直す
    Backoff,
}

impl AcquirePolicy {
    pub const ALL: [AcquirePolicy; 4] = [
        AcquirePolicy::LeftFirst,
        AcquirePolicy::LastReversed,
        AcquirePolicy::Alternating,
        AcquirePolicy::Backoff,
    ];

    /// index 番の哲学者 (全 count 人) が左のフォークから取るか
    pub fn left_first(&self, index: usize, count: usize) -> bool {
        match self {
            AcquirePolicy::LeftFirst | AcquirePolicy::Backoff => true,
            AcquirePolicy::LastReversed => index + 1 != count,
            AcquirePolicy::Alternating => index % 2 == 0,
        }
    }

    pub fn backs_off(&self) -> bool {
        matches!(self, AcquirePolicy::Backoff)
    }

    /// 循環待ちを起こしうるか
    pub fn may_deadlock(&self) -> bool {
        matches!(self, AcquirePolicy::LeftFirst)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AcquirePolicy::LeftFirst => "left-first",
            AcquirePolicy::LastReversed => "last-reversed",
            AcquirePolicy::Alternating => "alternating",
            AcquirePolicy::Backoff => "backoff",
        }
    }
}

impl fmt::Display for AcquirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AcquirePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AcquirePolicy::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConfigError::UnknownPolicy(s.to_string()))
    }
}
