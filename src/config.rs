use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;
use crate::policy::AcquirePolicy;

/// ミリ秒単位の閉区間。ここから一様に待ち時間を選ぶ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MillisRange {
    pub min: u64,
    pub max: u64,
}

impl MillisRange {
    pub const ZERO: MillisRange = MillisRange { min: 0, max: 0 };

    pub const fn new(min: u64, max: u64) -> Self {
        MillisRange { min, max }
    }

    pub fn sample(&self) -> Duration {
        if self.min >= self.max {
            return Duration::from_millis(self.min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min..=self.max))
    }

    fn check(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvertedRange {
                name,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl fmt::Display for MillisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

// "3000..6000" または "250" (固定値)
impl FromStr for MillisRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ConfigError::BadRange(s.to_string());
        match s.split_once("..") {
            Some((min, max)) => Ok(MillisRange {
                min: min.trim().parse().map_err(|_| bad())?,
                max: max.trim().parse().map_err(|_| bad())?,
            }),
            None => {
                let v = s.trim().parse().map_err(|_| bad())?;
                Ok(MillisRange { min: v, max: v })
            }
        }
    }
}

/// シミュレーションのパラメータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub philosophers: usize,
    pub meals: usize,
    pub think: MillisRange,
    pub eat: MillisRange,
    pub policy: AcquirePolicy,
    /// 1本目と2本目のフォークを取る間に挟む待ち時間
    pub grab_pause: Duration,
    pub backoff: MillisRange,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            philosophers: 5,
            meals: 7,
            think: MillisRange::new(3000, 6000),
            eat: MillisRange::new(5000, 10000),
            policy: AcquirePolicy::default(),
            grab_pause: Duration::ZERO,
            backoff: MillisRange::new(1, 10),
        }
    }
}

impl Config {
    /// 待ち時間なしで回す設定。テスト用
    pub fn instant(philosophers: usize, meals: usize) -> Self {
        Config {
            philosophers,
            meals,
            think: MillisRange::ZERO,
            eat: MillisRange::ZERO,
            backoff: MillisRange::new(0, 1),
            ..Config::default()
        }
    }

    pub fn philosophers(mut self, n: usize) -> Self {
        self.philosophers = n;
        self
    }

    pub fn meals(mut self, m: usize) -> Self {
        self.meals = m;
        self
    }

    pub fn think(mut self, r: MillisRange) -> Self {
        self.think = r;
        self
    }

    pub fn eat(mut self, r: MillisRange) -> Self {
        self.eat = r;
        self
    }

    pub fn policy(mut self, p: AcquirePolicy) -> Self {
        self.policy = p;
        self
    }

    pub fn grab_pause(mut self, d: Duration) -> Self {
        self.grab_pause = d;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.philosophers < 2 {
            return Err(ConfigError::TooFewPhilosophers(self.philosophers));
        }
        self.think.check("think")?;
        self.eat.check("eat")?;
        self.backoff.check("backoff")?;
        Ok(())
    }
}
