//! Worker records and worker-scoped ticket queries.

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;

use crate::error::Result;
use crate::model::*;
use crate::ports::WorkerStore;

const WORKER_COLUMNS: &str = "id, user_id, status_id, window_id";

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &WorkerFilter) {
    qb.push(" WHERE TRUE");
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status_id) = filter.status_id {
        qb.push(" AND status_id = ").push_bind(status_id);
    }
    if let Some(window_id) = filter.window_id {
        qb.push(" AND window_id = ").push_bind(window_id);
    }
}

#[async_trait]
impl WorkerStore for super::Db {
    async fn insert(&self, new: NewWorker) -> Result<Worker> {
        let worker = sqlx::query_as::<_, Worker>(
            "INSERT INTO workers (user_id, status_id, window_id)
             VALUES ($1, $2, $3)
             RETURNING id, user_id, status_id, window_id",
        )
        .bind(new.user_id)
        .bind(new.status_id)
        .bind(new.window_id)
        .fetch_one(self.pool())
        .await?;
        Ok(worker)
    }

    async fn select_by_id(&self, id: WorkerId) -> Result<Option<Worker>> {
        Ok(self.select(&WorkerFilter::by_id(id), None).await?.into_iter().next())
    }

    async fn select_by_user_id(&self, user_id: UserId) -> Result<Option<Worker>> {
        Ok(self
            .select(&WorkerFilter::by_user(user_id), None)
            .await?
            .into_iter()
            .next())
    }

    async fn select(&self, filter: &WorkerFilter, page: Option<Page>) -> Result<Vec<Worker>> {
        let mut qb = QueryBuilder::new(format!("SELECT {WORKER_COLUMNS} FROM workers"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY id");
        if let Some(page) = page {
            qb.push(" LIMIT ")
                .push_bind(i64::from(page.limit))
                .push(" OFFSET ")
                .push_bind(i64::from(page.offset));
        }
        let rows = qb.build_query_as::<Worker>().fetch_all(self.pool()).await?;
        Ok(rows)
    }

    async fn update(&self, filter: &WorkerFilter, patch: &WorkerPatch) -> Result<Vec<Worker>> {
        if patch.is_empty() {
            return self.select(filter, None).await;
        }

        let mut qb = QueryBuilder::new("UPDATE workers SET ");
        {
            let mut set = qb.separated(", ");
            if let Some(user_id) = patch.user_id {
                set.push("user_id = ").push_bind_unseparated(user_id);
            }
            if let Some(status_id) = patch.status_id {
                set.push("status_id = ").push_bind_unseparated(status_id);
            }
            if let Some(window_id) = patch.window_id {
                set.push("window_id = ").push_bind_unseparated(window_id);
            }
        }
        push_filter(&mut qb, filter);
        qb.push(format!(" RETURNING {WORKER_COLUMNS}"));

        let rows = qb.build_query_as::<Worker>().fetch_all(self.pool()).await?;
        Ok(rows)
    }

    async fn delete(&self, filter: &WorkerFilter) -> Result<Vec<Worker>> {
        let mut qb = QueryBuilder::new("DELETE FROM workers");
        push_filter(&mut qb, filter);
        qb.push(format!(" RETURNING {WORKER_COLUMNS}"));
        let rows = qb.build_query_as::<Worker>().fetch_all(self.pool()).await?;
        Ok(rows)
    }

    async fn statuses(&self) -> Result<Vec<StatusRecord>> {
        let rows =
            sqlx::query_as::<_, StatusRecord>("SELECT id, name FROM worker_statuses ORDER BY id")
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }

    async fn in_progress_tickets(&self, id: WorkerId) -> Result<Vec<TicketId>> {
        let rows = sqlx::query_scalar::<_, TicketId>(
            "SELECT t.id FROM tickets t
             JOIN ticket_statuses s ON s.id = t.status_id
             WHERE t.worker_id = $1 AND s.name IN ('called', 'serving')
             ORDER BY t.id",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn served_ticket_count(&self, id: WorkerId, period: ServicePeriod) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(t.id) FROM tickets t
             JOIN ticket_statuses s ON s.id = t.status_id
             WHERE t.issued_at > $1 AND t.issued_at < $2
             AND s.name = 'served'
             AND t.worker_id = $3",
        )
        .bind(period.start)
        .bind(period.end)
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn average_service_time(
        &self,
        id: WorkerId,
        period: ServicePeriod,
    ) -> Result<Option<Duration>> {
        let seconds: Option<f64> = sqlx::query_scalar(
            "SELECT EXTRACT(EPOCH FROM AVG(t.service_time))::float8 FROM tickets t
             JOIN ticket_statuses s ON s.id = t.status_id
             WHERE t.issued_at > $1 AND t.issued_at < $2
             AND s.name = 'served'
             AND t.worker_id = $3",
        )
        .bind(period.start)
        .bind(period.end)
        .bind(id)
        .fetch_one(self.pool())
        .await?;
        Ok(seconds.map(|s| Duration::from_secs_f64(s.max(0.0))))
    }
}
