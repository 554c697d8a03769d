use std::sync::Arc;

use domain::{
    InterestRecord, InterestRepository, PairKey, SwipeDecision, SwipeOutcome, UserId,
};

use crate::{
    clock::Clock,
    error::ApplicationError,
    retry::{retry_transient, AttemptError, RetryPolicy},
};

/// 兴趣记录账本：记录滑动决定并派生互相匹配的边沿。
///
/// 每次写入都是对规范记录的一次原子条件操作（首次插入用
/// create-if-absent，之后用版本号 compare-and-swap），因此两个几乎同时的
/// 相向 like 只会有一次调用观察到 `is_new_match = true`。
pub struct InterestLedger {
    repository: Arc<dyn InterestRepository>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl InterestLedger {
    pub fn new(
        repository: Arc<dyn InterestRepository>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            clock,
            retry,
        }
    }

    pub async fn record_swipe(
        &self,
        actor: UserId,
        target: UserId,
        decision: SwipeDecision,
    ) -> Result<SwipeOutcome, ApplicationError> {
        let pair = PairKey::new(actor, target)?;

        let outcome = retry_transient(&self.retry, "record_swipe", move || {
            self.try_record(pair, actor, decision)
        })
        .await?;

        if outcome.is_new_match {
            tracing::info!(pair = %pair, actor = %actor, "新的互相匹配");
        } else {
            tracing::debug!(
                pair = %pair,
                actor = %actor,
                decision = %decision,
                mutual = outcome.mutual,
                "记录滑动"
            );
        }
        Ok(outcome)
    }

    async fn try_record(
        &self,
        pair: PairKey,
        actor: UserId,
        decision: SwipeDecision,
    ) -> Result<SwipeOutcome, AttemptError> {
        let now = self.clock.now();

        match self.repository.find(pair).await? {
            None => {
                let mut record = InterestRecord::new(pair, now);
                let transition = record.apply(actor, decision, now)?;
                record.version = 1;
                // 并发的首次滑动会让其中一方得到 Conflict，重试时走 CAS 分支
                self.repository.insert_if_absent(record).await?;
                Ok(transition.outcome)
            }
            Some(mut record) => {
                let expected = record.version;
                let transition = record.apply(actor, decision, now)?;
                if !transition.changed {
                    return Ok(transition.outcome);
                }
                record.version = expected + 1;
                self.repository.compare_and_swap(record, expected).await?;
                Ok(transition.outcome)
            }
        }
    }

    /// 点查用户对的兴趣记录
    pub async fn record(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<InterestRecord>, ApplicationError> {
        let pair = PairKey::new(a, b)?;
        Ok(self.repository.find(pair).await?)
    }

    /// 与 `user` 互相匹配的用户，按最近互动倒序
    pub async fn matches_for(&self, user: UserId) -> Result<Vec<UserId>, ApplicationError> {
        let records = self.repository.list_mutual(user).await?;
        Ok(records
            .into_iter()
            .filter_map(|record| record.pair.other(user))
            .collect())
    }
}
