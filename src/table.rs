use std::io;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info};

use crate::config::Config;
use crate::error::{ConfigError, ForkError, SimulationError};
use crate::fork::{Fork, ForkState};
use crate::gate::StartGate;
use crate::philosopher::{Event, Philosopher, PhilosopherState};

/// ある瞬間のテーブルの様子 (コピー)
///
/// 複数のフィールドを順番に読むだけなので、遷移の途中を跨いだ不整合な値が見えることもある。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub philosophers: Vec<PhilosopherState>,
    pub forks: Vec<ForkState>,
}

impl TableSnapshot {
    /// 全員の残り予算の合計
    pub fn remaining(&self) -> usize {
        self.philosophers.iter().map(|p| p.remaining).sum()
    }

    pub fn eating(&self) -> usize {
        self.philosophers.iter().filter(|p| p.eating).count()
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }
}

/// 観測者用の読み取り専用ハンドル
#[derive(Clone)]
pub struct TableView {
    philosophers: Vec<Arc<Philosopher>>,
    forks: Vec<Arc<Fork>>,
}

impl TableView {
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            philosophers: self.philosophers.iter().map(|p| p.state()).collect(),
            forks: self.forks.iter().map(|f| f.state()).collect(),
        }
    }
}

/// 終了したスレッドを数える
struct Latch {
    running: Mutex<usize>,
    cond: Condvar,
}

impl Latch {
    fn new(n: usize) -> Self {
        Latch {
            running: Mutex::new(n),
            cond: Condvar::new(),
        }
    }

    fn count_down(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        *running -= 1;
        if *running == 0 {
            self.cond.notify_all();
        }
    }

    fn wait_timeout(&self, dur: Duration) -> bool {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let (running, _) = self
            .cond
            .wait_timeout_while(running, dur, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *running == 0
    }
}

// panic した場合も drop で数を減らす
struct LatchGuard(Arc<Latch>);

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

type Handle = JoinHandle<Result<(), ForkError>>;
type Job = Box<dyn FnOnce() -> Result<(), ForkError> + Send>;

/// 全員が食べ終わった後の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub meals: Vec<usize>,
    pub elapsed: Duration,
}

/// フォークと哲学者を環状に並べたテーブル
///
/// 哲学者 i の左は フォーク i、右は フォーク (i + 1) % n。
pub struct Table {
    config: Config,
    gate: Arc<StartGate>,
    view: TableView,
}

impl Table {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    /// 各哲学者のイベントを tx に流す
    pub fn with_journal(config: &Config, tx: Sender<Event>) -> Result<Self, ConfigError> {
        Self::build(config, Some(tx))
    }

    fn build(config: &Config, tx: Option<Sender<Event>>) -> Result<Self, ConfigError> {
        config.validate()?;

        let n = config.philosophers;
        let gate = Arc::new(StartGate::new());
        let forks: Vec<Arc<Fork>> = (0..n).map(|i| Arc::new(Fork::new(i))).collect();

        let philosophers = (0..n)
            .map(|i| {
                let left = forks[i].clone();
                let right = forks[(i + 1) % n].clone();
                let p = Philosopher::new(i, left, right, gate.clone(), config);
                match &tx {
                    Some(tx) => Arc::new(p.with_journal(tx.clone())),
                    None => Arc::new(p),
                }
            })
            .collect();

        Ok(Table {
            config: config.clone(),
            gate,
            view: TableView {
                philosophers,
                forks,
            },
        })
    }

    pub fn view(&self) -> TableView {
        self.view.clone()
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.view.snapshot()
    }

    /// ゲートを開けてから全員のスレッドを起動する
    pub fn start(self) -> Result<RunningTable, SimulationError> {
        self.start_with(|name, job| thread::Builder::new().name(name).spawn(job))
    }

    // 途中で起動に失敗したら、起動済みのスレッドを待ってからエラーを返す
    fn start_with<S>(self, mut spawn: S) -> Result<RunningTable, SimulationError>
    where
        S: FnMut(String, Job) -> io::Result<Handle>,
    {
        info!(
            "{} philosophers sit down, {} meals each, policy {}",
            self.config.philosophers, self.config.meals, self.config.policy
        );

        // 全員が同じゲートを共有しているので、1回開ければ全員が進める
        self.gate.signal();

        let latch = Arc::new(Latch::new(self.view.philosophers.len()));
        let started = Instant::now();
        let mut handles = Vec::new();

        for p in &self.view.philosophers {
            let p0 = p.clone();
            let guard = LatchGuard(latch.clone());
            let job: Job = Box::new(move || {
                let _guard = guard;
                p0.run()
            });

            match spawn(format!("philosopher-{}", p.index()), job) {
                Ok(t) => handles.push(t),
                Err(e) => {
                    error!(
                        "cannot start philosopher {}: {}, waiting for {} started",
                        p.index(),
                        e,
                        handles.len()
                    );
                    // 環が欠けているので、起動済みの哲学者は必ず食べ終わる
                    for t in handles {
                        let _ = t.join();
                    }
                    return Err(SimulationError::Spawn(e));
                }
            }
        }

        Ok(RunningTable {
            view: self.view,
            handles,
            latch,
            started,
        })
    }

    pub fn run(self) -> Result<Summary, SimulationError> {
        self.start()?.join()
    }
}

/// スレッド起動後のテーブル
pub struct RunningTable {
    view: TableView,
    handles: Vec<Handle>,
    latch: Arc<Latch>,
    started: Instant,
}

impl RunningTable {
    pub fn view(&self) -> TableView {
        self.view.clone()
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.view.snapshot()
    }

    /// dur 以内に全員が終われば true。デッドロックしていれば false
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        self.latch.wait_timeout(dur)
    }

    /// 全員のスレッドを待つ。デッドロックしている場合は返らない
    pub fn join(self) -> Result<Summary, SimulationError> {
        let mut first_err = None;

        for (i, t) in self.handles.into_iter().enumerate() {
            let err = match t.join() {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => SimulationError::Fork(e),
                Err(_) => SimulationError::Panicked { index: i },
            };
            error!("philosopher {} failed: {}", i, err);
            first_err.get_or_insert(err);
        }

        if let Some(e) = first_err {
            return Err(e);
        }

        let summary = Summary {
            meals: self.view.philosophers.iter().map(|p| p.meals()).collect(),
            elapsed: self.started.elapsed(),
        };
        info!(
            "everyone finished: {} meals in {:?}",
            summary.meals.iter().sum::<usize>(),
            summary.elapsed
        );
        Ok(summary)
    }
}
