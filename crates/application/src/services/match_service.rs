use std::sync::Arc;

use domain::{InterestRecord, NotificationType, SwipeDecision, SwipeOutcome, UserId};

use crate::{
    error::ApplicationError,
    services::{InterestLedger, NotificationDispatcher, NotifyRequest},
};

/// 滑动用例：写兴趣记录，新匹配时给双方发送匹配通知
pub struct MatchService {
    ledger: Arc<InterestLedger>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl MatchService {
    pub fn new(ledger: Arc<InterestLedger>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { ledger, dispatcher }
    }

    /// 记录滑动。
    ///
    /// 匹配通知失败只记录告警，不影响已经写入的滑动结果。
    pub async fn swipe(
        &self,
        actor: UserId,
        target: UserId,
        decision: SwipeDecision,
    ) -> Result<SwipeOutcome, ApplicationError> {
        let outcome = self.ledger.record_swipe(actor, target, decision).await?;

        if outcome.is_new_match {
            for (from, to) in [(actor, target), (target, actor)] {
                let request = NotifyRequest::new(NotificationType::Match, from, to)
                    .with_message("You have a new match");
                if let Err(err) = self.dispatcher.notify(request).await {
                    tracing::warn!(actor = %from, target = %to, error = %err, "匹配通知发送失败");
                }
            }
        }
        Ok(outcome)
    }

    pub async fn matches(&self, user: UserId) -> Result<Vec<UserId>, ApplicationError> {
        self.ledger.matches_for(user).await
    }

    pub async fn record(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<InterestRecord>, ApplicationError> {
        self.ledger.record(a, b).await
    }
}
