use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::error::ForkError;

/// 隣り合う2人の哲学者で共有されるフォーク
///
/// 取得と解放は別々の呼び出しになる (食事中ずっと持ち続けるため)。
/// そのためガードではなく、所有者を Mutex で守り Condvar で待機させる。
pub struct Fork {
    index: usize,
    owner: Mutex<Option<usize>>, // None なら誰も持っていない
    cond: Condvar,
}

/// 観測者に渡すためのコピー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkState {
    pub index: usize,
    pub held: bool,
    pub owner: Option<usize>,
}

impl Fork {
    pub fn new(index: usize) -> Self {
        Fork {
            index,
            owner: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    // owner への代入は1回の書き込みなので、poison されていても値は壊れていない
    fn lock(&self) -> MutexGuard<'_, Option<usize>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 空くまでブロックしてから `by` を所有者にする。タイムアウトはない
    pub fn acquire(&self, by: usize) {
        let mut owner = self.lock();
        while owner.is_some() {
            owner = self
                .cond
                .wait(owner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *owner = Some(by);
        debug!("fork {} picked up by {}", self.index, by);
    }

    /// 空いていれば取得して true を返す
    pub fn try_acquire(&self, by: usize) -> bool {
        let mut owner = self.lock();
        if owner.is_some() {
            return false;
        }
        *owner = Some(by);
        debug!("fork {} picked up by {} (try)", self.index, by);
        true
    }

    /// `by` が持っている場合だけ解放する。それ以外は状態を変えずにエラー
    pub fn release(&self, by: usize) -> Result<(), ForkError> {
        let mut owner = self.lock();
        match *owner {
            Some(o) if o == by => {}
            Some(o) => {
                warn!("philosopher {} tried to put down fork {} held by {}", by, self.index, o);
                return Err(ForkError::NotOwner {
                    fork: self.index,
                    by,
                    owner: o,
                });
            }
            None => {
                warn!("philosopher {} tried to put down free fork {}", by, self.index);
                return Err(ForkError::NotHeld {
                    fork: self.index,
                    by,
                });
            }
        }
        *owner = None;
        drop(owner);

        debug!("fork {} put down by {}", self.index, by);
        self.cond.notify_one();
        Ok(())
    }

    pub fn owner(&self) -> Option<usize> {
        *self.lock()
    }

    pub fn is_held(&self) -> bool {
        self.owner().is_some()
    }

    pub fn state(&self) -> ForkState {
        let owner = self.owner();
        ForkState {
            index: self.index,
            held: owner.is_some(),
            owner,
        }
    }
}
