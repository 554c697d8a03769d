//! 兴趣记录Repository实现

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    InterestRecord, InterestRepository, PairKey, RepositoryError, RepositoryResult,
    SwipeDecision, UserId,
};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{invalid_data, map_sqlx_err, PgStore};

#[derive(Debug, FromRow)]
struct DbInterest {
    low_user: Uuid,
    high_user: Uuid,
    low_decision: Option<String>,
    high_decision: Option<String>,
    mutual: bool,
    created_at: DateTime<Utc>,
    last_interaction_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<DbInterest> for InterestRecord {
    type Error = RepositoryError;

    fn try_from(value: DbInterest) -> Result<Self, Self::Error> {
        let pair = PairKey::new(UserId::from(value.low_user), UserId::from(value.high_user))
            .map_err(|err| invalid_data(err.to_string()))?;

        let mut decisions = BTreeMap::new();
        for (user, decision) in [
            (pair.low(), value.low_decision),
            (pair.high(), value.high_decision),
        ] {
            if let Some(decision) = decision {
                let decision =
                    SwipeDecision::parse(&decision).map_err(|err| invalid_data(err.to_string()))?;
                decisions.insert(user, decision);
            }
        }

        Ok(InterestRecord {
            pair,
            decisions,
            mutual: value.mutual,
            created_at: value.created_at,
            last_interaction_at: value.last_interaction_at,
            version: value.version,
        })
    }
}

fn decision_column(record: &InterestRecord, user: UserId) -> Option<&'static str> {
    record.decision_of(user).map(SwipeDecision::as_str)
}

const SELECT_INTEREST: &str = r#"
    SELECT low_user, high_user, low_decision, high_decision, mutual,
           created_at, last_interaction_at, version
    FROM interests
"#;

#[async_trait]
impl InterestRepository for PgStore {
    async fn find(&self, pair: PairKey) -> RepositoryResult<Option<InterestRecord>> {
        let record = sqlx::query_as::<_, DbInterest>(&format!("{SELECT_INTEREST} WHERE pair_key = $1"))
            .bind(pair.as_key())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_err)?;
        record.map(InterestRecord::try_from).transpose()
    }

    async fn insert_if_absent(&self, record: InterestRecord) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO interests (
                pair_key, low_user, high_user, low_decision, high_decision,
                mutual, created_at, last_interaction_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (pair_key) DO NOTHING
            "#,
        )
        .bind(record.pair.as_key())
        .bind(Uuid::from(record.pair.low()))
        .bind(Uuid::from(record.pair.high()))
        .bind(decision_column(&record, record.pair.low()))
        .bind(decision_column(&record, record.pair.high()))
        .bind(record.mutual)
        .bind(record.created_at)
        .bind(record.last_interaction_at)
        .bind(record.version)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::conflict("interest"));
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        record: InterestRecord,
        expected_version: i64,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE interests
            SET low_decision = $2,
                high_decision = $3,
                mutual = $4,
                last_interaction_at = $5,
                version = $6
            WHERE pair_key = $1 AND version = $7
            "#,
        )
        .bind(record.pair.as_key())
        .bind(decision_column(&record, record.pair.low()))
        .bind(decision_column(&record, record.pair.high()))
        .bind(record.mutual)
        .bind(record.last_interaction_at)
        .bind(record.version)
        .bind(expected_version)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM interests WHERE pair_key = $1)")
                .bind(record.pair.as_key())
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_err)?;
        if exists {
            Err(RepositoryError::conflict("interest"))
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn list_mutual(&self, user: UserId) -> RepositoryResult<Vec<InterestRecord>> {
        let records = sqlx::query_as::<_, DbInterest>(&format!(
            "{SELECT_INTEREST} WHERE mutual AND (low_user = $1 OR high_user = $1) \
             ORDER BY last_interaction_at DESC"
        ))
        .bind(Uuid::from(user))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(InterestRecord::try_from).collect()
    }
}
