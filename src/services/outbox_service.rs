use crate::error::{AppError, AppResult};
use crate::external::MailerService;
use crate::models::*;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// 单封邮件的最大投递尝试次数
pub const MAX_SEND_ATTEMPTS: i64 = 5;
/// 每轮投递的批大小
const SEND_BATCH_SIZE: i64 = 20;

/// 邮件发件箱：入队与业务操作同事务，投递由后台循环完成，
/// 至少一次语义，失败不影响主操作。
#[derive(Clone)]
pub struct OutboxService {
    pool: SqlitePool,
    mailer: MailerService,
}

impl OutboxService {
    pub fn new(pool: SqlitePool, mailer: MailerService) -> Self {
        Self { pool, mailer }
    }

    pub async fn enqueue_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> AppResult<()> {
        sqlx::query("INSERT INTO email_outbox (recipient, subject, body) VALUES (?, ?, ?)")
            .bind(recipient)
            .bind(subject)
            .bind(body)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// 投递一批待发邮件，返回成功数
    pub async fn process_pending(&self) -> AppResult<usize> {
        let pending = sqlx::query_as::<_, EmailOutboxEntry>(
            r#"
            SELECT * FROM email_outbox
            WHERE status = 'pending'
            ORDER BY created_at
            LIMIT ?
            "#,
        )
        .bind(SEND_BATCH_SIZE)
        .fetch_all(&self.pool)
        .await?;

        let mut sent = 0usize;
        for entry in pending {
            match self
                .mailer
                .send(&entry.recipient, &entry.subject, &entry.body)
                .await
            {
                Ok(()) => {
                    sqlx::query(
                        r#"
                        UPDATE email_outbox
                        SET status = 'sent', attempts = attempts + 1, sent_at = CURRENT_TIMESTAMP
                        WHERE id = ?
                        "#,
                    )
                    .bind(entry.id)
                    .execute(&self.pool)
                    .await?;
                    sent += 1;
                }
                Err(e) => {
                    // 超过尝试上限后标记 failed，保留错误供排查
                    let attempts = entry.attempts + 1;
                    let status = if attempts >= MAX_SEND_ATTEMPTS {
                        "failed"
                    } else {
                        "pending"
                    };
                    log::warn!(
                        "Failed to deliver email id={} (attempt {attempts}): {e}",
                        entry.id
                    );
                    sqlx::query(
                        r#"
                        UPDATE email_outbox
                        SET status = ?, attempts = ?, last_error = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(status)
                    .bind(attempts)
                    .bind(e.to_string())
                    .bind(entry.id)
                    .execute(&self.pool)
                    .await?;
                }
            }
        }

        Ok(sent)
    }

    /// 管理端按状态查看发件箱（投递情况与重试次数可观测）
    pub async fn list_entries(
        &self,
        query: &OutboxQuery,
    ) -> AppResult<PaginatedResponse<EmailOutboxEntry>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let (total, entries) = match query.status {
            Some(status) => {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM email_outbox WHERE status = ?")
                        .bind(status)
                        .fetch_one(&self.pool)
                        .await?;
                let entries = sqlx::query_as::<_, EmailOutboxEntry>(
                    "SELECT * FROM email_outbox WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(status)
                .bind(params.get_limit() as i64)
                .bind(params.get_offset() as i64)
                .fetch_all(&self.pool)
                .await?;
                (total, entries)
            }
            None => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_outbox")
                    .fetch_one(&self.pool)
                    .await?;
                let entries = sqlx::query_as::<_, EmailOutboxEntry>(
                    "SELECT * FROM email_outbox ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(params.get_limit() as i64)
                .bind(params.get_offset() as i64)
                .fetch_all(&self.pool)
                .await?;
                (total, entries)
            }
        };

        Ok(PaginatedResponse::new(entries, &params, total))
    }

    pub async fn retry_failed(&self, entry_id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE email_outbox SET status = 'pending', attempts = 0 WHERE id = ? AND status = 'failed'",
        )
        .bind(entry_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "Failed outbox entry not found".to_string(),
            ));
        }

        Ok(())
    }
}
