//! 食事する哲学者の問題のシミュレーション
//!
//! 哲学者ごとに1スレッドを立て、環状に並べたフォークを取り合わせる。
//! フォークを取る順番は [`AcquirePolicy`] で選ぶ。`LeftFirst` はデッドロックしうる。

pub mod config;
pub mod error;
pub mod fork;
pub mod gate;
pub mod observer;
pub mod philosopher;
pub mod policy;
pub mod table;

pub use config::{Config, MillisRange};
pub use error::{ConfigError, ForkError, SimulationError};
pub use fork::{Fork, ForkState};
pub use gate::StartGate;
pub use observer::{Observer, Violation};
pub use philosopher::{Event, Phase, Philosopher, PhilosopherState};
pub use policy::AcquirePolicy;
pub use table::{RunningTable, Summary, Table, TableSnapshot, TableView};
