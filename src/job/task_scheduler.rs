use std::collections::HashMap;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::debug;

/// 周期任务的最小间隔，低于该值按该值执行
const MIN_INTERVAL_MS: u64 = 100;

/// 定时任务底座
///
/// 管理命名的周期任务与自管理的长循环任务，统一通过广播信号停止。
/// 同名注册会先终止旧任务。
pub struct TimerHub {
    tasks: HashMap<String, JoinHandle<()>>,
    shutdown_sender: broadcast::Sender<()>,
}

impl TimerHub {
    pub fn new() -> Self {
        let (shutdown_sender, _) = broadcast::channel(16);
        Self {
            tasks: HashMap::new(),
            shutdown_sender,
        }
    }

    /// 订阅停止信号，供未注册进来的临时任务配合停机
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_sender.subscribe()
    }

    /// 注册命名周期任务，每 every_n_millis 触发一次（首次触发是立即的）
    pub fn add_periodic_task<F, Fut>(&mut self, name: String, every_n_millis: u64, task_fn: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut interval_timer = interval(Duration::from_millis(every_n_millis.max(MIN_INTERVAL_MS)));
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        task_fn().await;
                    }
                    _ = shutdown_receiver.recv() => {
                        debug!("周期任务 {} 停止", task_name);
                        break;
                    }
                }
            }
        });
        self.insert(name, handle);
    }

    /// 注册自管理的长循环任务，任务体自行在各等待点监听停止信号
    pub fn add_loop_task<F, Fut>(&mut self, name: String, task_fn: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let receiver = self.shutdown_sender.subscribe();
        let handle = tokio::spawn(task_fn(receiver));
        self.insert(name, handle);
    }

    /// 终止并移除命名任务，存在时返回 true
    pub fn remove_task(&mut self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some(handle) => {
                handle.abort();
                debug!("任务 {} 已移除", name);
                true
            }
            None => false,
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// 广播停止信号并等待全部任务退出
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_sender.send(());
        for (_, handle) in self.tasks.drain() {
            let _ = handle.await;
        }
    }

    fn insert(&mut self, name: String, handle: JoinHandle<()>) {
        if let Some(old) = self.tasks.insert(name, handle) {
            old.abort();
        }
    }
}

impl Default for TimerHub {
    fn default() -> Self {
        Self::new()
    }
}
