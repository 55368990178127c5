//! 可观察值
//!
//! 基于 tokio watch：写入方整体替换值，观察方随时读取最新快照或等待变化。
//! `update` 在 sender 的写锁内完成读-改-发布，并发写入不会丢失更新。

use tokio::sync::watch;

#[derive(Debug)]
pub struct Observable<T> {
    sender: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// 当前值
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// 订阅变化
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// 整体替换
    pub fn set(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// 原子读-改-发布，返回闭包的结果
    pub fn update<R>(&self, f: impl FnOnce(&T) -> (T, R)) -> R {
        let mut out = None;
        self.sender.send_modify(|current| {
            let (next, result) = f(current);
            *current = next;
            out = Some(result);
        });
        match out {
            Some(result) => result,
            None => unreachable!("send_modify always runs the closure"),
        }
    }
}

impl<T: Clone> Observable<T> {
    /// 闭包返回 None 时保持原值且不通知观察者
    pub fn update_if(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        self.sender.send_if_modified(|current| match f(current) {
            Some(next) => {
                *current = next;
                true
            }
            None => false,
        })
    }
}

impl<T: Clone + PartialEq> Observable<T> {
    /// 值相同时不通知观察者
    pub fn set_if_changed(&self, value: T) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}
