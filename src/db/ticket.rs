//! Ticket queue access via direct SQLx.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::*;
use crate::ports::QueueAccess;

/// Channel notified when a ticket rejoins a purpose queue.
pub const REQUEUE_CHANNEL: &str = "ticket_requeued";

#[async_trait]
impl QueueAccess for super::Db {
    async fn waiting_queue(&self, worker: WorkerId) -> Result<Vec<WaitingTicket>> {
        let rows = sqlx::query_as::<_, WaitingTicket>(
            "SELECT t.id, t.purpose_id FROM tickets t
             JOIN ticket_statuses s ON s.id = t.status_id
             WHERE t.worker_id = $1 AND s.name = 'waiting'
             ORDER BY t.issued_at, t.id",
        )
        .bind(worker)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn move_ticket_to_purpose_queue(
        &self,
        ticket: TicketId,
        purpose: PurposeId,
        notify: bool,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        let rows_affected = sqlx::query(
            "UPDATE tickets SET worker_id = NULL, purpose_id = $2 WHERE id = $1",
        )
        .bind(ticket)
        .bind(purpose)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("ticket {ticket}")));
        }

        // NOTIFY is transactional, only fires on commit
        if notify {
            let payload = serde_json::json!({
                "ticket_id": ticket,
                "purpose_id": purpose,
            });
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(REQUEUE_CHANNEL)
                .bind(payload.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
