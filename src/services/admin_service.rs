use crate::error::AppResult;
use crate::models::*;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Clone)]
pub struct AdminService {
    pool: SqlitePool,
}

impl AdminService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 后台总览：订单分布、营收、用户数、待处理退货与在用券数
    pub async fn dashboard_stats(&self) -> AppResult<DashboardStats> {
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let status_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let orders_by_status: HashMap<String, i64> = status_rows.into_iter().collect();
        let total_orders: i64 = orders_by_status.values().sum();

        let total_revenue: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total), 0) FROM orders WHERE status = 'delivered'",
        )
        .fetch_one(&self.pool)
        .await?;

        let pending_returns: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM return_requests WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;

        let now = Utc::now();
        let active_vouchers: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM vouchers
            WHERE starts_at <= ? AND ends_at >= ? AND current_usage < max_usage_total
            "#,
        )
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            total_users,
            total_orders,
            orders_by_status,
            total_revenue,
            pending_returns,
            active_vouchers,
        })
    }
}
