//! 任务存储抽象
//!
//! 定义任务状态机的唯一写入口，遵循依赖倒置原则

use async_trait::async_trait;

use crate::cancellation::CancellationFlag;
use crate::entities::{CancelOutcome, Job, JobError, JobResult};
use automl_errors::AutoMlResult;

/// 任务仓储抽象
///
/// 所有状态转换在实现内部以比较并交换的方式串行执行:
/// 未知id返回 `JobNotFound`，其余不变量违例一律返回冲突类错误，
/// 绝不静默忽略，调用方据此可以分辨竞态。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 登记新任务，初始状态Pending、进度0
    async fn create(&self, job: &Job) -> AutoMlResult<()>;

    async fn get(&self, id: &str) -> AutoMlResult<Job>;

    /// 原子的 Pending→Running 转换，防止同一任务被两个Worker执行
    async fn claim(&self, id: &str, worker_id: &str) -> AutoMlResult<Job>;

    /// 更新进度，仅Running可用且百分比单调不减；
    /// 终止态任务上的调用返回冲突错误，调用方应按警告处理
    /// （与取消的竞态是预期内的）
    async fn update_progress(&self, id: &str, percent: u8, message: &str) -> AutoMlResult<()>;

    /// 刷新Worker心跳时间，供Reaper判活
    async fn heartbeat(&self, id: &str) -> AutoMlResult<()>;

    /// Running→Succeeded；对完全相同的result重复调用是幂等的，
    /// 不一致的重复调用返回冲突
    async fn complete(&self, id: &str, result: JobResult) -> AutoMlResult<()>;

    /// Running→Failed
    async fn fail(&self, id: &str, error: JobError) -> AutoMlResult<()>;

    /// Pending/Running→Cancelled；任务已终止时返回 `TooLate`
    async fn cancel(&self, id: &str) -> AutoMlResult<CancelOutcome>;

    /// 任务关联的协作式取消标记
    async fn cancellation_flag(&self, id: &str) -> AutoMlResult<CancellationFlag>;

    /// Reaper扫描用: 当前所有Running任务的快照
    async fn find_running(&self) -> AutoMlResult<Vec<Job>>;

    /// 仅用于准入控制回滚: 删除一个尚未暴露给调用方的任务
    async fn remove(&self, id: &str) -> AutoMlResult<bool>;
}
