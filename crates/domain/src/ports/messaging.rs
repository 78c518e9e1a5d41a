use async_trait::async_trait;

use crate::entities::JobMessage;
use automl_errors::AutoMlResult;

/// 任务队列抽象
///
/// 每种任务类型使用独立的FIFO队列，队列深度有界。
/// 入队在队列满时立即拒绝（返回 `QueueFull`），由提交方做准入控制。
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 创建有界队列，capacity为0时表示不限制
    async fn create_queue(&self, queue: &str, capacity: usize) -> AutoMlResult<()>;
    /// 入队，队列已满时返回 `QueueFull` 而不是阻塞
    async fn try_publish(&self, queue: &str, message: &JobMessage) -> AutoMlResult<()>;
    /// 取出下一条消息；队列被关闭后返回 `None`
    async fn recv(&self, queue: &str) -> AutoMlResult<Option<JobMessage>>;
    async fn queue_size(&self, queue: &str) -> AutoMlResult<u32>;
}
