use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::config::{Config, MillisRange};
use crate::error::ForkError;
use crate::fork::Fork;
use crate::gate::StartGate;
use crate::policy::AcquirePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Thinking,
    Requesting,
    Eating,
    Releasing,
    Terminated,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Thinking,
            1 => Phase::Requesting,
            2 => Phase::Eating,
            3 => Phase::Releasing,
            _ => Phase::Terminated,
        }
    }
}

/// 哲学者が状態遷移のたびに送るイベント
///
/// Acquired は所有者を書き換えた後、Released は書き換える前に送るので、
/// 受信順に並べるとフォークごとに Acquired と Released が交互に現れる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Acquired { philosopher: usize, fork: usize },
    StartedEating { philosopher: usize },
    FinishedEating { philosopher: usize },
    Released { philosopher: usize, fork: usize },
    Terminated { philosopher: usize },
}

/// 観測者に渡すためのコピー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhilosopherState {
    pub index: usize,
    pub left: usize,
    pub right: usize,
    pub remaining: usize,
    pub eating: bool,
    pub meals: usize,
    pub phase: Phase,
}

pub struct Philosopher {
    index: usize,
    count: usize, // テーブルの人数
    left: Arc<Fork>,
    right: Arc<Fork>,
    gate: Arc<StartGate>,
    policy: AcquirePolicy,
    think: MillisRange,
    eat: MillisRange,
    backoff: MillisRange,
    grab_pause: Duration,

    // 書き込むのはこの哲学者のスレッドだけ。観測者は表示に使うだけなので Relaxed で読む
    remaining: AtomicUsize,
    eating: AtomicBool,
    meals: AtomicUsize,
    phase: AtomicU8,

    journal: Option<Sender<Event>>,
}

impl Philosopher {
    pub fn new(
        index: usize,
        left: Arc<Fork>,
        right: Arc<Fork>,
        gate: Arc<StartGate>,
        config: &Config,
    ) -> Self {
        Philosopher {
            index,
            count: config.philosophers,
            left,
            right,
            gate,
            policy: config.policy,
            think: config.think,
            eat: config.eat,
            backoff: config.backoff,
            grab_pause: config.grab_pause,
            remaining: AtomicUsize::new(config.meals),
            eating: AtomicBool::new(false),
            meals: AtomicUsize::new(0),
            phase: AtomicU8::new(Phase::Thinking as u8),
            journal: None,
        }
    }

    pub fn with_journal(mut self, tx: Sender<Event>) -> Self {
        self.journal = Some(tx);
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Relaxed)
    }

    pub fn is_eating(&self) -> bool {
        self.eating.load(Ordering::Relaxed)
    }

    pub fn meals(&self) -> usize {
        self.meals.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    pub fn state(&self) -> PhilosopherState {
        PhilosopherState {
            index: self.index,
            left: self.left.index(),
            right: self.right.index(),
            remaining: self.remaining(),
            eating: self.is_eating(),
            meals: self.meals(),
            phase: self.phase(),
        }
    }

    /// 予算を使い切るまで 考える → フォークを取る → 食べる → フォークを置く を繰り返す
    pub fn run(&self) -> Result<(), ForkError> {
        while self.remaining() > 0 {
            self.think();
            self.request_forks()?;
            self.eat();
            self.put_down_forks()?;
        }

        self.set_phase(Phase::Terminated);
        self.emit(Event::Terminated {
            philosopher: self.index,
        });
        debug!("philosopher {} is done after {} meals", self.index, self.meals());
        Ok(())
    }

    fn think(&self) {
        self.set_phase(Phase::Thinking);
        thread::sleep(self.think.sample());
    }

    fn request_forks(&self) -> Result<(), ForkError> {
        self.set_phase(Phase::Requesting);
        self.gate.wait();

        if self.policy.backs_off() {
            return self.request_with_backoff();
        }

        let (first, second) = if self.policy.left_first(self.index, self.count) {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };
        self.pick_up(first);
        self.pause_between_forks();
        self.pick_up(second);
        Ok(())
    }

    // 右が取れなければ左を置いてやり直す。循環待ちは起きないが飢餓はありうる
    fn request_with_backoff(&self) -> Result<(), ForkError> {
        loop {
            self.pick_up(&self.left);
            self.pause_between_forks();

            if self.right.try_acquire(self.index) {
                self.emit(Event::Acquired {
                    philosopher: self.index,
                    fork: self.right.index(),
                });
                return Ok(());
            }

            self.put_down(&self.left)?;
            let wait = self.backoff.sample();
            debug!(
                "philosopher {} backs off for {:?}, fork {} is busy",
                self.index,
                wait,
                self.right.index()
            );
            thread::sleep(wait);
        }
    }

    fn pause_between_forks(&self) {
        if !self.grab_pause.is_zero() {
            thread::sleep(self.grab_pause);
        }
    }

    fn pick_up(&self, fork: &Fork) {
        fork.acquire(self.index);
        self.emit(Event::Acquired {
            philosopher: self.index,
            fork: fork.index(),
        });
    }

    // 持ち主は本人にしか外せないので、自分が持っていれば release は必ず成功する。
    // 持っていない場合は Released を記録せずにエラーだけ返す
    fn put_down(&self, fork: &Fork) -> Result<(), ForkError> {
        if fork.owner() != Some(self.index) {
            return fork.release(self.index);
        }
        self.emit(Event::Released {
            philosopher: self.index,
            fork: fork.index(),
        });
        fork.release(self.index)
    }

    fn holds_both(&self) -> bool {
        self.left.owner() == Some(self.index) && self.right.owner() == Some(self.index)
    }

    fn eat(&self) {
        debug_assert!(self.holds_both(), "philosopher {} eats without both forks", self.index);

        self.remaining.fetch_sub(1, Ordering::Relaxed);
        self.meals.fetch_add(1, Ordering::Relaxed);
        self.eating.store(true, Ordering::Relaxed);
        self.set_phase(Phase::Eating);
        self.emit(Event::StartedEating {
            philosopher: self.index,
        });
        debug!("philosopher {} eats, {} left", self.index, self.remaining());

        thread::sleep(self.eat.sample());

        self.eating.store(false, Ordering::Relaxed);
        self.emit(Event::FinishedEating {
            philosopher: self.index,
        });
    }

    fn put_down_forks(&self) -> Result<(), ForkError> {
        self.set_phase(Phase::Releasing);
        self.put_down(&self.right)?;
        self.put_down(&self.left)
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    fn emit(&self, ev: Event) {
        if let Some(tx) = &self.journal {
            if tx.send(ev).is_err() {
                trace!("journal closed, dropped {:?}", ev);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::mpsc;

    use super::*;

    fn pair(config: &Config) -> (Arc<Fork>, Arc<Fork>, Arc<StartGate>, Philosopher) {
        let left = Arc::new(Fork::new(0));
        let right = Arc::new(Fork::new(1));
        let gate = Arc::new(StartGate::new());
        let p = Philosopher::new(0, left.clone(), right.clone(), gate.clone(), config);
        (left, right, gate, p)
    }

    #[test]
    fn test_eats_whole_budget() {
        let (left, right, gate, p) = pair(&Config::instant(2, 3));
        gate.signal();
        p.run().unwrap();

        assert_eq!(p.remaining(), 0);
        assert_eq!(p.meals(), 3);
        assert!(!p.is_eating());
        assert_eq!(p.phase(), Phase::Terminated);
        assert!(!left.is_held());
        assert!(!right.is_held());
    }

    #[test]
    fn test_zero_budget_skips_gate() {
        // ゲートは閉じたままだが、予算 0 なら待たずに終わる
        let (left, _, _, p) = pair(&Config::instant(2, 0));
        p.run().unwrap();
        assert_eq!(p.meals(), 0);
        assert_eq!(p.phase(), Phase::Terminated);
        assert!(!left.is_held());
    }

    #[test]
    fn test_waits_for_gate() {
        let (_, _, gate, p) = pair(&Config::instant(2, 1));
        let p = Arc::new(p);
        let p0 = p.clone();
        let t = thread::spawn(move || p0.run());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(p.phase(), Phase::Requesting);
        assert_eq!(p.meals(), 0);

        gate.signal();
        t.join().unwrap().unwrap();
        assert_eq!(p.meals(), 1);
    }

    #[test]
    fn test_journal_order() {
        let (tx, rx) = mpsc::channel();
        let (_, _, gate, p) = pair(&Config::instant(2, 1));
        let p = p.with_journal(tx);
        gate.signal();
        p.run().unwrap();
        drop(p);

        let events: Vec<Event> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                Event::Acquired {
                    philosopher: 0,
                    fork: 0
                },
                Event::Acquired {
                    philosopher: 0,
                    fork: 1
                },
                Event::StartedEating { philosopher: 0 },
                Event::FinishedEating { philosopher: 0 },
                Event::Released {
                    philosopher: 0,
                    fork: 1
                },
                Event::Released {
                    philosopher: 0,
                    fork: 0
                },
                Event::Terminated { philosopher: 0 },
            ]
        );
    }

    #[test]
    fn test_put_down_unheld_fork() {
        let (tx, rx) = mpsc::channel();
        let (left, right, _, p) = pair(&Config::instant(2, 1));
        let p = p.with_journal(tx);

        assert_eq!(
            p.put_down(&right),
            Err(ForkError::NotHeld { fork: 1, by: 0 })
        );

        left.acquire(1);
        assert_eq!(
            p.put_down(&left),
            Err(ForkError::NotOwner {
                fork: 0,
                by: 0,
                owner: 1
            })
        );
        assert_eq!(left.owner(), Some(1));

        // 失敗した解放はジャーナルに残らない
        drop(p);
        assert_eq!(rx.iter().count(), 0);
    }

    #[test]
    fn test_right_first_when_last() {
        // 2人のテーブルで番号 1 は最後なので、LastReversed では右 (0番) から取る
        let (tx, rx) = mpsc::channel();
        let config = Config::instant(2, 1).policy(AcquirePolicy::LastReversed);
        let left = Arc::new(Fork::new(1));
        let right = Arc::new(Fork::new(0));
        let gate = Arc::new(StartGate::new());
        gate.signal();
        let p = Philosopher::new(1, left, right, gate, &config).with_journal(tx);
        p.run().unwrap();
        drop(p);

        assert_eq!(
            rx.recv().unwrap(),
            Event::Acquired {
                philosopher: 1,
                fork: 0
            }
        );
    }

    #[test]
    fn test_backoff_waits_for_busy_fork() {
        let config = Config::instant(2, 1).policy(AcquirePolicy::Backoff);
        let (left, right, gate, p) = pair(&config);
        gate.signal();

        // 右を他人が持っている間は食べられない
        right.acquire(1);
        let p = Arc::new(p);
        let p0 = p.clone();
        let t = thread::spawn(move || p0.run());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(p.meals(), 0);

        right.release(1).unwrap();
        t.join().unwrap().unwrap();
        assert_eq!(p.meals(), 1);
        assert!(!left.is_held());
        assert!(!right.is_held());
    }
}
