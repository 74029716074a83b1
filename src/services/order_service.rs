use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::loyalty_service::{
    EARN_VND_PER_POINT, LoyaltyService, REFERRAL_BONUS, REFERRAL_MIN_ORDER_VALUE,
};
use crate::services::outbox_service::OutboxService;
use crate::services::voucher_service::{FLAT_SHIPPING_FEE, VoucherService};
use crate::utils::{format_vnd, generate_order_no};
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// 单次批量更新的订单数上限
pub const BULK_UPDATE_LIMIT: usize = 100;

#[derive(Clone)]
pub struct OrderService {
    pool: SqlitePool,
    voucher_service: VoucherService,
}

impl OrderService {
    pub fn new(pool: SqlitePool, voucher_service: VoucherService) -> Self {
        Self {
            pool,
            voucher_service,
        }
    }

    /// 下单：库存扣减、券校验与核销、发件箱入队在同一事务内
    pub async fn create_order(
        &self,
        user_id: i64,
        request: CreateOrderRequest,
    ) -> AppResult<OrderDetailResponse> {
        if request.items.is_empty() {
            return Err(AppError::ValidationError(
                "Order must contain at least one item".to_string(),
            ));
        }
        if request.items.iter().any(|i| i.quantity <= 0) {
            return Err(AppError::ValidationError(
                "Item quantity must be positive".to_string(),
            ));
        }
        if request.shipping_address.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Shipping address is required".to_string(),
            ));
        }

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let mut tx = self.pool.begin().await?;

        // 逐项检查并扣减库存
        let mut subtotal = 0i64;
        let mut lines: Vec<(Product, i64)> = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = sqlx::query_as::<_, Product>(
                "SELECT * FROM products WHERE id = ? AND is_active = 1",
            )
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Product {} not found", item.product_id))
            })?;

            let updated =
                sqlx::query("UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?")
                    .bind(item.quantity)
                    .bind(product.id)
                    .bind(item.quantity)
                    .execute(&mut *tx)
                    .await?;
            if updated.rows_affected() == 0 {
                return Err(AppError::ValidationError(format!(
                    "Insufficient stock for {}",
                    product.name
                )));
            }

            subtotal += product.price * item.quantity;
            lines.push((product, item.quantity));
        }

        let shipping_fee = FLAT_SHIPPING_FEE;

        // 券校验（只读），核销在下方同事务完成
        let mut discount_amount = 0i64;
        let mut voucher_code: Option<String> = None;
        let mut voucher_id: Option<i64> = None;
        if let Some(code) = request.voucher_code.as_deref().filter(|c| !c.is_empty()) {
            let validation = self
                .voucher_service
                .validate(
                    user_id,
                    &ValidateVoucherRequest {
                        code: code.to_string(),
                        order_value: subtotal,
                        product_ids: Some(lines.iter().map(|(p, _)| p.id).collect()),
                        applied_codes: None,
                    },
                )
                .await?;

            if !validation.valid {
                return Err(AppError::ValidationError(
                    validation
                        .message
                        .unwrap_or_else(|| "Voucher is not applicable".to_string()),
                ));
            }

            let voucher = self.voucher_service.find_by_code(code).await?;
            discount_amount = validation.discount_amount.unwrap_or(0);
            voucher_code = Some(voucher.code.clone());
            voucher_id = Some(voucher.id);
        }

        let total = (subtotal + shipping_fee - discount_amount).max(0);
        let order_no = generate_order_no();
        let payment_method = request.payment_method.unwrap_or_else(|| "cod".to_string());

        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (
                order_no, user_id, payment_method, subtotal, shipping_fee,
                discount_amount, voucher_code, total, shipping_address
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&order_no)
        .bind(user_id)
        .bind(&payment_method)
        .bind(subtotal)
        .bind(shipping_fee)
        .bind(discount_amount)
        .bind(&voucher_code)
        .bind(total)
        .bind(request.shipping_address.trim())
        .fetch_one(&mut *tx)
        .await?;

        for (product, quantity) in &lines {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, product_name, unit_price, quantity, is_sale_price)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(order_id)
            .bind(product.id)
            .bind(&product.name)
            .bind(product.price)
            .bind(quantity)
            .bind(product.is_on_sale)
            .execute(&mut *tx)
            .await?;
        }

        // 核销：带守卫计数，满额时整个下单失败回滚
        if let Some(vid) = voucher_id {
            VoucherService::record_usage_in_tx(
                &mut tx,
                vid,
                user_id,
                order_id,
                discount_amount,
                subtotal,
            )
            .await?;
        }

        OutboxService::enqueue_in_tx(
            &mut tx,
            &user.email,
            &format!("Order {order_no} confirmed"),
            &format!(
                "Your order {order_no} totalling {} has been received and is pending processing.",
                format_vnd(total)
            ),
        )
        .await?;

        tx.commit().await?;

        log::info!("Order {order_no} created for user {user_id}, total {total}");
        self.get_order(order_id, user_id, false).await
    }

    pub async fn get_order(
        &self,
        order_id: i64,
        user_id: i64,
        is_admin: bool,
    ) -> AppResult<OrderDetailResponse> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        if !is_admin && order.user_id != user_id {
            return Err(AppError::NotFound("Order not found".to_string()));
        }

        let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ?")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        let shipping_address = order.shipping_address.clone();
        Ok(OrderDetailResponse {
            order: OrderResponse::from(order),
            shipping_address,
            items,
        })
    }

    pub async fn get_user_orders(
        &self,
        user_id: i64,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<OrderResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let (total, orders) = match query.status {
            Some(status) => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM orders WHERE user_id = ? AND status = ?",
                )
                .bind(user_id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
                let orders = sqlx::query_as::<_, Order>(
                    "SELECT * FROM orders WHERE user_id = ? AND status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(user_id)
                .bind(status)
                .bind(params.get_limit() as i64)
                .bind(params.get_offset() as i64)
                .fetch_all(&self.pool)
                .await?;
                (total, orders)
            }
            None => {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = ?")
                        .bind(user_id)
                        .fetch_one(&self.pool)
                        .await?;
                let orders = sqlx::query_as::<_, Order>(
                    "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(user_id)
                .bind(params.get_limit() as i64)
                .bind(params.get_offset() as i64)
                .fetch_all(&self.pool)
                .await?;
                (total, orders)
            }
        };

        let items: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
        Ok(PaginatedResponse::new(items, &params, total))
    }

    pub async fn list_all_orders(
        &self,
        query: &OrderQuery,
    ) -> AppResult<PaginatedResponse<OrderResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let (total, orders) = match query.status {
            Some(status) => {
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = ?")
                        .bind(status)
                        .fetch_one(&self.pool)
                        .await?;
                let orders = sqlx::query_as::<_, Order>(
                    "SELECT * FROM orders WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(status)
                .bind(params.get_limit() as i64)
                .bind(params.get_offset() as i64)
                .fetch_all(&self.pool)
                .await?;
                (total, orders)
            }
            None => {
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
                    .fetch_one(&self.pool)
                    .await?;
                let orders = sqlx::query_as::<_, Order>(
                    "SELECT * FROM orders ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(params.get_limit() as i64)
                .bind(params.get_offset() as i64)
                .fetch_all(&self.pool)
                .await?;
                (total, orders)
            }
        };

        let items: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
        Ok(PaginatedResponse::new(items, &params, total))
    }

    /// 状态迁移：迁移表校验 + 同事务副作用
    /// (delivered → 回款+积分；cancelled → 回补库存)，均入队通知邮件
    pub async fn update_status(
        &self,
        request: &UpdateOrderStatusRequest,
    ) -> AppResult<OrderResponse> {
        let mut tx = self.pool.begin().await?;
        let order = self
            .apply_transition(&mut tx, request.order_id, request.status, request.payment_status)
            .await?;
        tx.commit().await?;

        Ok(OrderResponse::from(order))
    }

    async fn apply_transition(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        order_id: i64,
        new_status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> AppResult<Order> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

        if !order.status.can_transition_to(new_status) {
            return Err(AppError::ValidationError(
                order.status.transition_error(new_status),
            ));
        }

        let now = Utc::now();
        let mut payment_status = payment_status.unwrap_or(order.payment_status);
        let mut delivered_at = order.delivered_at;
        let mut cancelled_at = order.cancelled_at;

        match new_status {
            OrderStatus::Delivered => {
                // 货到付款假设：签收即回款
                payment_status = PaymentStatus::Paid;
                delivered_at = Some(now);
            }
            OrderStatus::Cancelled => {
                cancelled_at = Some(now);
            }
            _ => {}
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, payment_status = ?, delivered_at = ?, cancelled_at = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(new_status)
        .bind(payment_status)
        .bind(delivered_at)
        .bind(cancelled_at)
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

        match new_status {
            OrderStatus::Delivered => {
                self.on_delivered(tx, &order).await?;
            }
            OrderStatus::Cancelled => {
                self.restock_items(tx, order_id).await?;
            }
            _ => {}
        }

        let user_email: String = sqlx::query_scalar("SELECT email FROM users WHERE id = ?")
            .bind(order.user_id)
            .fetch_one(&mut **tx)
            .await?;
        OutboxService::enqueue_in_tx(
            tx,
            &user_email,
            &format!("Order {} update", order.order_no),
            &format!("Your order {} is now {}.", order.order_no, new_status),
        )
        .await?;

        let updated = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_one(&mut **tx)
            .await?;

        log::info!(
            "Order {} transitioned {} -> {}",
            order.order_no,
            order.status,
            new_status
        );
        Ok(updated)
    }

    async fn on_delivered(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        order: &Order,
    ) -> AppResult<()> {
        // 签收得积分
        let points = order.total / EARN_VND_PER_POINT;
        if points > 0 {
            LoyaltyService::apply_points_in_tx(
                tx,
                order.user_id,
                PointTransactionType::Earn,
                points,
                "Order delivered",
                Some(&order.order_no),
            )
            .await?;
        }

        // 被推荐人的首笔签收订单满足门槛时给推荐人发奖励
        let referred_by: Option<i64> =
            sqlx::query_scalar("SELECT referred_by FROM users WHERE id = ?")
                .bind(order.user_id)
                .fetch_one(&mut **tx)
                .await?;
        if let Some(referrer_id) = referred_by
            && order.total >= REFERRAL_MIN_ORDER_VALUE
        {
            let delivered_before: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM orders WHERE user_id = ? AND status = 'delivered' AND id != ?",
            )
            .bind(order.user_id)
            .bind(order.id)
            .fetch_one(&mut **tx)
            .await?;
            if delivered_before == 0 {
                LoyaltyService::apply_points_in_tx(
                    tx,
                    referrer_id,
                    PointTransactionType::Bonus,
                    REFERRAL_BONUS,
                    "Referral bonus",
                    Some(&order.order_no),
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn restock_items(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        order_id: i64,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + (
                SELECT oi.quantity FROM order_items oi
                WHERE oi.order_id = ? AND oi.product_id = products.id
            )
            WHERE id IN (SELECT product_id FROM order_items WHERE order_id = ?)
            "#,
        )
        .bind(order_id)
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// 客户自助取消：仅限本人订单且仍在 pending
    pub async fn cancel_order(&self, user_id: i64, order_id: i64) -> AppResult<OrderResponse> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = ? AND user_id = ?",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        if order.status != OrderStatus::Pending {
            return Err(AppError::ValidationError(format!(
                "Only pending orders can be cancelled, this order is {}",
                order.status
            )));
        }

        let mut tx = self.pool.begin().await?;
        let updated = self
            .apply_transition(&mut tx, order_id, OrderStatus::Cancelled, None)
            .await?;
        tx.commit().await?;

        Ok(OrderResponse::from(updated))
    }

    /// 批量更新：逐单独立校验，聚合成功/失败，不做整批回滚
    pub async fn bulk_update_status(
        &self,
        request: &BulkUpdateStatusRequest,
    ) -> AppResult<BulkUpdateStatusResponse> {
        if request.order_ids.is_empty() {
            return Err(AppError::ValidationError(
                "order_ids must not be empty".to_string(),
            ));
        }
        if request.order_ids.len() > BULK_UPDATE_LIMIT {
            return Err(AppError::ValidationError(format!(
                "Cannot update more than {BULK_UPDATE_LIMIT} orders at once"
            )));
        }

        let mut results = Vec::with_capacity(request.order_ids.len());
        let mut updated = 0usize;
        let mut failed = 0usize;

        for &order_id in &request.order_ids {
            let update = UpdateOrderStatusRequest {
                order_id,
                status: request.status,
                payment_status: None,
            };
            match self.update_status(&update).await {
                Ok(_) => {
                    updated += 1;
                    results.push(BulkUpdateResult {
                        order_id,
                        success: true,
                        message: None,
                    });
                }
                Err(e) => {
                    failed += 1;
                    results.push(BulkUpdateResult {
                        order_id,
                        success: false,
                        message: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(BulkUpdateStatusResponse {
            updated,
            failed,
            results,
        })
    }
}
