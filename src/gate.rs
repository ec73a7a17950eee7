use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// 一度だけ開くスタートゲート
///
/// 全員が同じインスタンスを参照するので、signal を1回呼ぶと待っている全スレッドが起きる。
/// リセットはできない。
pub struct StartGate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl StartGate {
    pub fn new() -> Self {
        StartGate {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn signal(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.cond.notify_all();
    }

    /// 開くまで待つ。開いた後は即座に返る
    pub fn wait(&self) {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let _open = self
            .cond
            .wait_while(open, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// 時間内に開いたら true
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let (open, _) = self
            .cond
            .wait_timeout_while(open, dur, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
        *open
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}
