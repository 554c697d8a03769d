//! 兴趣记录实体
//!
//! 每个无序用户对最多一条记录，记录双方的滑动决定并派生互相匹配状态。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{PairKey, Timestamp, UserId};

/// 滑动决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDecision {
    Like,
    Pass,
}

impl SwipeDecision {
    pub fn is_like(self) -> bool {
        matches!(self, Self::Like)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Pass => "pass",
        }
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        match value {
            "like" => Ok(Self::Like),
            "pass" => Ok(Self::Pass),
            other => Err(DomainError::invalid_argument(
                "decision",
                format!("unknown decision `{other}`"),
            )),
        }
    }
}

impl fmt::Display for SwipeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次滑动的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeOutcome {
    pub mutual: bool,
    /// 仅在 mutual 从 false 变为 true 的那一次写入上为 true
    pub is_new_match: bool,
}

/// `InterestRecord::apply` 的返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeTransition {
    pub outcome: SwipeOutcome,
    /// 记录是否被修改；未修改时无需写回存储
    pub changed: bool,
}

/// 用户对的兴趣记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestRecord {
    pub pair: PairKey,
    pub decisions: BTreeMap<UserId, SwipeDecision>,
    pub mutual: bool,
    pub created_at: Timestamp,
    pub last_interaction_at: Timestamp,
    /// 乐观并发版本号，每次写入加一
    pub version: i64,
}

impl InterestRecord {
    pub fn new(pair: PairKey, now: Timestamp) -> Self {
        Self {
            pair,
            decisions: BTreeMap::new(),
            mutual: false,
            created_at: now,
            last_interaction_at: now,
            version: 0,
        }
    }

    pub fn decision_of(&self, user: UserId) -> Option<SwipeDecision> {
        self.decisions.get(&user).copied()
    }

    /// 记录 `actor` 的决定并重新派生 mutual。
    ///
    /// 相同决定重复提交不修改记录。任一方 pass 即否决匹配。
    pub fn apply(
        &mut self,
        actor: UserId,
        decision: SwipeDecision,
        now: Timestamp,
    ) -> DomainResult<SwipeTransition> {
        if !self.pair.contains(actor) {
            return Err(DomainError::NotParticipant { user_id: actor });
        }

        if self.decision_of(actor) == Some(decision) {
            return Ok(SwipeTransition {
                outcome: SwipeOutcome {
                    mutual: self.mutual,
                    is_new_match: false,
                },
                changed: false,
            });
        }

        let was_mutual = self.mutual;
        self.decisions.insert(actor, decision);
        self.mutual = self.derive_mutual();
        self.last_interaction_at = now;

        Ok(SwipeTransition {
            outcome: SwipeOutcome {
                mutual: self.mutual,
                is_new_match: !was_mutual && self.mutual,
            },
            changed: true,
        })
    }

    fn derive_mutual(&self) -> bool {
        self.pair
            .members()
            .iter()
            .all(|member| self.decision_of(*member).is_some_and(SwipeDecision::is_like))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn setup() -> (UserId, UserId, InterestRecord) {
        let a = UserId::from(Uuid::new_v4());
        let b = UserId::from(Uuid::new_v4());
        let record = InterestRecord::new(PairKey::new(a, b).unwrap(), Utc::now());
        (a, b, record)
    }

    #[test]
    fn mutual_like_is_a_new_match_exactly_once() {
        let (a, b, mut record) = setup();

        let first = record.apply(a, SwipeDecision::Like, Utc::now()).unwrap();
        assert!(first.changed);
        assert!(!first.outcome.mutual);
        assert!(!first.outcome.is_new_match);

        let second = record.apply(b, SwipeDecision::Like, Utc::now()).unwrap();
        assert!(second.outcome.mutual);
        assert!(second.outcome.is_new_match);

        let repeat = record.apply(b, SwipeDecision::Like, Utc::now()).unwrap();
        assert!(!repeat.changed);
        assert!(repeat.outcome.mutual);
        assert!(!repeat.outcome.is_new_match);
    }

    #[test]
    fn pass_vetoes_the_match() {
        let (a, b, mut record) = setup();
        record.apply(a, SwipeDecision::Like, Utc::now()).unwrap();
        let outcome = record.apply(b, SwipeDecision::Pass, Utc::now()).unwrap().outcome;
        assert!(!outcome.mutual);
        assert!(!outcome.is_new_match);
        assert!(!record.mutual);
    }

    #[test]
    fn pass_after_match_clears_mutual_and_like_again_rematches() {
        let (a, b, mut record) = setup();
        record.apply(a, SwipeDecision::Like, Utc::now()).unwrap();
        record.apply(b, SwipeDecision::Like, Utc::now()).unwrap();

        let unmatch = record.apply(a, SwipeDecision::Pass, Utc::now()).unwrap();
        assert!(!unmatch.outcome.mutual);

        let rematch = record.apply(a, SwipeDecision::Like, Utc::now()).unwrap();
        assert!(rematch.outcome.is_new_match);
    }

    #[test]
    fn outsider_cannot_swipe_on_pair() {
        let (_, _, mut record) = setup();
        let outsider = UserId::from(Uuid::new_v4());
        assert!(matches!(
            record.apply(outsider, SwipeDecision::Like, Utc::now()),
            Err(DomainError::NotParticipant { .. })
        ));
    }

    #[test]
    fn decision_parsing() {
        assert_eq!(SwipeDecision::parse("like").unwrap(), SwipeDecision::Like);
        assert_eq!(SwipeDecision::parse("pass").unwrap(), SwipeDecision::Pass);
        assert!(SwipeDecision::parse("superlike").is_err());
    }
}
