use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::loyalty_service::LoyaltyService;
use crate::services::outbox_service::OutboxService;
use crate::utils::format_vnd;
use sqlx::{Sqlite, SqlitePool, Transaction};

#[derive(Clone)]
pub struct ReturnService {
    pool: SqlitePool,
}

impl ReturnService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_return(
        &self,
        user_id: i64,
        request: CreateReturnRequest,
    ) -> AppResult<ReturnResponse> {
        if request.items.is_empty() {
            return Err(AppError::ValidationError(
                "Return must contain at least one item".to_string(),
            ));
        }
        if request.reason.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Return reason is required".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = ? AND user_id = ?",
        )
        .bind(request.order_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        if order.status != OrderStatus::Delivered {
            return Err(AppError::ValidationError(
                "Only delivered orders can be returned".to_string(),
            ));
        }

        // 同一订单不允许并存未完结的退货单
        let open_returns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM return_requests WHERE order_id = ? AND status IN ('pending', 'approved')",
        )
        .bind(request.order_id)
        .fetch_one(&mut *tx)
        .await?;
        if open_returns > 0 {
            return Err(AppError::ValidationError(
                "An open return request already exists for this order".to_string(),
            ));
        }

        // 校验退货行并计算退款金额
        let mut refund_amount = 0i64;
        for item in &request.items {
            let order_item = sqlx::query_as::<_, OrderItem>(
                "SELECT * FROM order_items WHERE id = ? AND order_id = ?",
            )
            .bind(item.order_item_id)
            .bind(request.order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "Order item {} does not belong to this order",
                    item.order_item_id
                ))
            })?;

            if item.quantity <= 0 || item.quantity > order_item.quantity {
                return Err(AppError::ValidationError(format!(
                    "Invalid return quantity for {}",
                    order_item.product_name
                )));
            }

            refund_amount += order_item.unit_price * item.quantity;
        }
        refund_amount = refund_amount.min(order.total);

        let refund_method = request.refund_method.unwrap_or(RefundMethod::Points);
        let return_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO return_requests (order_id, user_id, reason, refund_method, refund_amount)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(request.order_id)
        .bind(user_id)
        .bind(request.reason.trim())
        .bind(refund_method)
        .bind(refund_amount)
        .fetch_one(&mut *tx)
        .await?;

        for item in &request.items {
            sqlx::query(
                "INSERT INTO return_items (return_id, order_item_id, quantity) VALUES (?, ?, ?)",
            )
            .bind(return_id)
            .bind(item.order_item_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let user_email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        OutboxService::enqueue_in_tx(
            &mut tx,
            &user_email,
            &format!("Return request received for order {}", order.order_no),
            &format!(
                "We received your return request for order {} ({} refund requested).",
                order.order_no,
                format_vnd(refund_amount)
            ),
        )
        .await?;

        tx.commit().await?;

        log::info!("Return {return_id} created for order {}", order.order_no);
        self.get_return(return_id).await
    }

    async fn get_return(&self, return_id: i64) -> AppResult<ReturnResponse> {
        let request = sqlx::query_as::<_, ReturnRequest>(
            "SELECT * FROM return_requests WHERE id = ?",
        )
        .bind(return_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Return request not found".to_string()))?;

        let items =
            sqlx::query_as::<_, ReturnItem>("SELECT * FROM return_items WHERE return_id = ?")
                .bind(return_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ReturnResponse {
            id: request.id,
            order_id: request.order_id,
            status: request.status,
            reason: request.reason,
            refund_method: request.refund_method,
            refund_amount: request.refund_amount,
            admin_note: request.admin_note,
            created_at: request.created_at,
            items,
        })
    }

    pub async fn list_user_returns(
        &self,
        user_id: i64,
        query: &ReturnQuery,
    ) -> AppResult<PaginatedResponse<ReturnResponse>> {
        self.list_returns(Some(user_id), query).await
    }

    pub async fn list_all_returns(
        &self,
        query: &ReturnQuery,
    ) -> AppResult<PaginatedResponse<ReturnResponse>> {
        self.list_returns(None, query).await
    }

    async fn list_returns(
        &self,
        user_id: Option<i64>,
        query: &ReturnQuery,
    ) -> AppResult<PaginatedResponse<ReturnResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        // 动态拼接过滤条件
        let mut conditions = Vec::new();
        if user_id.is_some() {
            conditions.push("user_id = ?");
        }
        if query.status.is_some() {
            conditions.push("status = ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM return_requests {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(uid) = user_id {
            count_query = count_query.bind(uid);
        }
        if let Some(status) = query.status {
            count_query = count_query.bind(status);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM return_requests {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query_as::<_, ReturnRequest>(&list_sql);
        if let Some(uid) = user_id {
            list_query = list_query.bind(uid);
        }
        if let Some(status) = query.status {
            list_query = list_query.bind(status);
        }
        let requests = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            let return_items =
                sqlx::query_as::<_, ReturnItem>("SELECT * FROM return_items WHERE return_id = ?")
                    .bind(request.id)
                    .fetch_all(&self.pool)
                    .await?;
            items.push(ReturnResponse {
                id: request.id,
                order_id: request.order_id,
                status: request.status,
                reason: request.reason,
                refund_method: request.refund_method,
                refund_amount: request.refund_amount,
                admin_note: request.admin_note,
                created_at: request.created_at,
                items: return_items,
            });
        }

        Ok(PaginatedResponse::new(items, &params, total))
    }

    /// 管理端状态流转，completed 时回补库存并按退款方式发积分
    pub async fn update_status(
        &self,
        return_id: i64,
        admin_id: i64,
        request: UpdateReturnStatusRequest,
    ) -> AppResult<ReturnResponse> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, ReturnRequest>(
            "SELECT * FROM return_requests WHERE id = ?",
        )
        .bind(return_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Return request not found".to_string()))?;

        if !current.status.can_transition_to(request.status) {
            return Err(AppError::ValidationError(
                current.status.transition_error(request.status),
            ));
        }

        sqlx::query(
            r#"
            UPDATE return_requests
            SET status = ?, admin_note = COALESCE(?, admin_note), processed_by = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(request.status)
        .bind(&request.admin_note)
        .bind(admin_id)
        .bind(return_id)
        .execute(&mut *tx)
        .await?;

        if request.status == ReturnStatus::Completed {
            self.on_completed(&mut tx, &current).await?;
        }

        let user_email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
            .bind(current.user_id)
            .fetch_one(&mut *tx)
            .await?;
        OutboxService::enqueue_in_tx(
            &mut tx,
            &user_email,
            &format!("Return request #{return_id} update"),
            &format!("Your return request is now {}.", request.status),
        )
        .await?;

        tx.commit().await?;

        log::info!(
            "Return {return_id} transitioned {} -> {} by admin {admin_id}",
            current.status,
            request.status
        );
        self.get_return(return_id).await
    }

    async fn on_completed(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        request: &ReturnRequest,
    ) -> AppResult<()> {
        // 回补退回商品的库存
        sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + (
                SELECT ri.quantity FROM return_items ri
                JOIN order_items oi ON oi.id = ri.order_item_id
                WHERE ri.return_id = ? AND oi.product_id = products.id
            )
            WHERE id IN (
                SELECT oi.product_id FROM return_items ri
                JOIN order_items oi ON oi.id = ri.order_item_id
                WHERE ri.return_id = ?
            )
            "#,
        )
        .bind(request.id)
        .bind(request.id)
        .execute(&mut **tx)
        .await?;

        // 积分退款：按兑换汇率折算退款金额
        if request.refund_method == RefundMethod::Points {
            let points = request.refund_amount / RewardType::Discount.vnd_per_point();
            if points > 0 {
                LoyaltyService::apply_points_in_tx(
                    tx,
                    request.user_id,
                    PointTransactionType::Refund,
                    points,
                    "Return refund",
                    Some(&format!("return:{}", request.id)),
                )
                .await?;
            }
        }

        Ok(())
    }
}
