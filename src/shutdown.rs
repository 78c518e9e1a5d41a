use tokio::sync::broadcast;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 所有长生命周期组件订阅同一个broadcast通道，收到信号后
/// 各自收尾退出。克隆体共享同一个通道。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self { shutdown_tx }
    }

    pub fn sender(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        let subscriber_count = self.shutdown_tx.receiver_count();
        debug!("发送关闭信号给 {} 个订阅者", subscriber_count);
        // 忽略错误: 可能已经没有接收者
        let _ = self.shutdown_tx.send(());
        info!("关闭信号已发送");
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
