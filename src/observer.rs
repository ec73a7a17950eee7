use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::table::{TableSnapshot, TableView};

/// スナップショット上で見つかった不整合
///
/// スナップショットは遷移の途中を跨ぐことがあるので、これが出ても不正とは限らない。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("philosopher {philosopher} eats but fork {fork} is owned by {owner:?}")]
    EatingWithoutFork {
        philosopher: usize,
        fork: usize,
        owner: Option<usize>,
    },

    #[error("fork {fork} is owned by {owner}, who does not sit next to it")]
    ForeignOwner { fork: usize, owner: usize },
}

impl TableSnapshot {
    /// 食べている哲学者が両隣のフォークを持っているか、フォークの持ち主が隣の哲学者か
    pub fn violations(&self) -> Vec<Violation> {
        let mut v = Vec::new();
        let n = self.forks.len();

        for p in self.philosophers.iter().filter(|p| p.eating) {
            for fork in [p.left, p.right] {
                let owner = self.forks.get(fork).and_then(|f| f.owner);
                if owner != Some(p.index) {
                    v.push(Violation::EatingWithoutFork {
                        philosopher: p.index,
                        fork,
                        owner,
                    });
                }
            }
        }

        // フォーク i に手が届くのは 哲学者 i と 哲学者 i - 1 だけ
        for f in &self.forks {
            if let Some(owner) = f.owner {
                if owner != f.index && (owner + 1) % n != f.index {
                    v.push(Violation::ForeignOwner {
                        fork: f.index,
                        owner,
                    });
                }
            }
        }

        v
    }
}

/// コンソール表示用のテーブル
///
/// ```text
/// ================================================================================
///           T             E             T             T             T
/// F 0       F 1       F 2       F 3       F 4       F 0
///        P 0 ( 7)       P 1 ( 6)       P 2 ( 7)       P 3 ( 7)       P 4 ( 7)       :  1
/// ```
pub fn render(snapshot: &TableSnapshot) -> String {
    let n = snapshot.philosophers.len();

    let flags: Vec<&str> = snapshot
        .philosophers
        .iter()
        .map(|p| if p.eating { "E" } else { "T" })
        .collect();

    // 環を閉じるために最初のフォークをもう一度置く
    let forks: Vec<String> = snapshot
        .forks
        .iter()
        .chain(snapshot.forks.first())
        .map(|f| format!("F{:2}", f.index))
        .collect();

    let philosophers: Vec<String> = snapshot
        .philosophers
        .iter()
        .map(|p| format!("P{:2} ({:2})", p.index, p.remaining))
        .collect();

    format!(
        "{}\n          {}\n{}\n       {}       :  {}",
        "=".repeat(n * 16),
        flags.join("             "),
        forks.join("       "),
        philosophers.join("       "),
        snapshot.eating()
    )
}

/// 一定間隔でテーブルを覗いてログに出すスレッド
///
/// 全員の予算が 0 になるか、stop されるまで続ける。状態は一切書き換えない。
pub struct Observer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<usize>,
}

impl Observer {
    pub fn spawn(view: TableView, interval: Duration) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop0 = stop.clone();

        let handle = thread::Builder::new()
            .name("observer".to_string())
            .spawn(move || {
                let mut frames = 0;
                while !stop0.load(Ordering::Relaxed) {
                    let snapshot = view.snapshot();
                    for v in snapshot.violations() {
                        debug!("inconsistent view: {}", v);
                    }
                    info!("\n{}", render(&snapshot));
                    frames += 1;

                    if snapshot.is_finished() {
                        break;
                    }
                    thread::sleep(interval);
                }
                frames
            })?;

        Ok(Observer { stop, handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 止めて、描いたフレーム数を返す
    pub fn stop(self) -> usize {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.join() {
            Ok(frames) => frames,
            Err(_) => {
                warn!("observer thread panicked");
                0
            }
        }
    }
}
