//! 内存任务队列
//!
//! 基于Tokio有界channel实现的FIFO队列，适用于单进程部署。
//! 每个队列独立计数，入队在容量用尽时立即拒绝以形成背压。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use automl_domain::entities::JobMessage;
use automl_domain::ports::JobQueue;
use automl_errors::{AutoMlError, AutoMlResult};

/// 容量配置为0时实际使用的上限
const UNBOUNDED_CAPACITY: usize = 1 << 20;

struct QueueChannels {
    sender: mpsc::Sender<JobMessage>,
    /// 接收端用Arc包装，多个Worker共享同一个消费端
    receiver: Arc<Mutex<mpsc::Receiver<JobMessage>>>,
    size: Arc<AtomicU32>,
}

#[derive(Default)]
pub struct InMemoryJobQueue {
    queues: RwLock<HashMap<String, QueueChannels>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channels(
        &self,
        queue: &str,
    ) -> AutoMlResult<(Arc<Mutex<mpsc::Receiver<JobMessage>>>, Arc<AtomicU32>)> {
        let queues = self.queues.read().await;
        queues
            .get(queue)
            .map(|c| (Arc::clone(&c.receiver), Arc::clone(&c.size)))
            .ok_or_else(|| AutoMlError::MessageQueue(format!("队列不存在: {queue}")))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn create_queue(&self, queue: &str, capacity: usize) -> AutoMlResult<()> {
        let mut queues = self.queues.write().await;
        if queues.contains_key(queue) {
            return Ok(());
        }
        let bound = if capacity == 0 {
            UNBOUNDED_CAPACITY
        } else {
            capacity
        };
        let (sender, receiver) = mpsc::channel(bound);
        queues.insert(
            queue.to_string(),
            QueueChannels {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
                size: Arc::new(AtomicU32::new(0)),
            },
        );
        info!("创建队列 '{}' (容量: {})", queue, bound);
        Ok(())
    }

    async fn try_publish(&self, queue: &str, message: &JobMessage) -> AutoMlResult<()> {
        let (sender, size) = {
            let queues = self.queues.read().await;
            let channels = queues
                .get(queue)
                .ok_or_else(|| AutoMlError::MessageQueue(format!("队列不存在: {queue}")))?;
            (channels.sender.clone(), Arc::clone(&channels.size))
        };

        match sender.try_send(message.clone()) {
            Ok(()) => {
                size.fetch_add(1, Ordering::Relaxed);
                debug!("消息 {} 入队 '{}'", message.id, queue);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("队列 '{}' 已满，拒绝消息 {}", queue, message.id);
                Err(AutoMlError::QueueFull {
                    queue: queue.to_string(),
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AutoMlError::MessageQueue(format!(
                "队列 '{queue}' 已关闭"
            ))),
        }
    }

    async fn recv(&self, queue: &str) -> AutoMlResult<Option<JobMessage>> {
        let (receiver, size) = self.channels(queue).await?;
        let mut rx = receiver.lock().await;
        let message = rx.recv().await;
        if let Some(ref message) = message {
            size.fetch_sub(1, Ordering::Relaxed);
            debug!("消息 {} 出队 '{}'", message.id, queue);
        }
        Ok(message)
    }

    async fn queue_size(&self, queue: &str) -> AutoMlResult<u32> {
        let (_, size) = self.channels(queue).await?;
        Ok(size.load(Ordering::Relaxed))
    }
}
