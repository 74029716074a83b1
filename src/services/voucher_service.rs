use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::format_vnd;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

/// 默认运费，freeship 券按此金额抵扣
pub const FLAT_SHIPPING_FEE: i64 = 30_000;

/// 资格判定失败原因，消息面向用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    NotActive,
    NotStarted,
    Expired,
    UsageLimitReached,
    PerUserLimitReached,
    MinOrderNotMet { shortfall: i64 },
    AudienceMismatch,
    ProductNotApplicable,
    ExcludedProduct,
    SaleItemsOnly,
    StackingNotAllowed,
    AccountRestricted,
}

impl IneligibleReason {
    pub fn message(&self) -> String {
        match self {
            IneligibleReason::NotActive => "This voucher is not active".to_string(),
            IneligibleReason::NotStarted => "This voucher is not valid yet".to_string(),
            IneligibleReason::Expired => "This voucher has expired".to_string(),
            IneligibleReason::UsageLimitReached => {
                "This voucher has reached its usage limit".to_string()
            }
            IneligibleReason::PerUserLimitReached => {
                "You have already used this voucher the maximum number of times".to_string()
            }
            IneligibleReason::MinOrderNotMet { shortfall } => format!(
                "Add {} more to your order to use this voucher",
                format_vnd(*shortfall)
            ),
            IneligibleReason::AudienceMismatch => {
                "This voucher is not available for your account".to_string()
            }
            IneligibleReason::ProductNotApplicable => {
                "This voucher does not apply to the products in your order".to_string()
            }
            IneligibleReason::ExcludedProduct => {
                "Your order contains products excluded from this voucher".to_string()
            }
            IneligibleReason::SaleItemsOnly => {
                "This voucher cannot be used on sale items".to_string()
            }
            IneligibleReason::StackingNotAllowed => {
                "This voucher cannot be combined with other vouchers".to_string()
            }
            IneligibleReason::AccountRestricted => {
                "Your account is not eligible to use vouchers".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedDiscount {
    pub discount_amount: i64,
    pub final_price: i64,
}

pub type EligibilityOutcome = Result<EvaluatedDiscount, IneligibleReason>;

/// 单人限额判定，资格判定与核销事务共用同一条规则
fn per_user_cap_reached(prior_use_count: i64, max_usage_per_user: i64) -> bool {
    prior_use_count >= max_usage_per_user
}

/// 折扣金额计算。percentage 向下取整并受 max_discount 封顶，
/// fixed 不超过订单金额，freeship 按运费抵扣。
pub fn compute_discount(voucher: &Voucher, order_value: i64, shipping_fee: i64) -> i64 {
    let raw = match voucher.voucher_type {
        VoucherType::Percentage => {
            let discount = order_value * voucher.value / 100;
            match voucher.max_discount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        VoucherType::Fixed => voucher.value.min(order_value),
        VoucherType::Freeship => shipping_fee,
    };
    raw.max(0)
}

/// 资格判定，纯函数，首个失败即短路。不修改任何使用计数。
pub fn evaluate_voucher(
    voucher: &Voucher,
    ctx: &EligibilityContext,
    now: DateTime<Utc>,
) -> AppResult<EligibilityOutcome> {
    // 受限账户的行政拦截先于一切券规则
    if ctx.restricted {
        return Ok(Err(IneligibleReason::AccountRestricted));
    }

    // 1. 启用状态与有效期
    if !voucher.is_active {
        return Ok(Err(IneligibleReason::NotActive));
    }
    if now < voucher.starts_at {
        return Ok(Err(IneligibleReason::NotStarted));
    }
    if now > voucher.ends_at {
        return Ok(Err(IneligibleReason::Expired));
    }

    // 2. 总使用上限
    if voucher.current_usage >= voucher.max_usage_total {
        return Ok(Err(IneligibleReason::UsageLimitReached));
    }

    // 3. 单人使用上限
    if per_user_cap_reached(ctx.prior_use_count, voucher.max_usage_per_user) {
        return Ok(Err(IneligibleReason::PerUserLimitReached));
    }

    // 4. 最低订单金额，提示差额
    if ctx.order_value < voucher.min_order_value {
        return Ok(Err(IneligibleReason::MinOrderNotMet {
            shortfall: voucher.min_order_value - ctx.order_value,
        }));
    }

    // 5. 目标人群
    let audience_ok = match voucher.target_audience {
        TargetAudience::All => true,
        TargetAudience::New => ctx.segment == CustomerSegment::New,
        TargetAudience::Regular => ctx.segment == CustomerSegment::Regular,
        TargetAudience::Loyal => ctx.segment == CustomerSegment::Loyal,
        TargetAudience::Vip => ctx.segment == CustomerSegment::Vip,
        TargetAudience::LongTerm => {
            ctx.account_age_days >= CustomerSegment::LONG_TERM_MIN_AGE_DAYS
        }
        TargetAudience::Tier => voucher.target_tiers()?.contains(&ctx.tier),
        TargetAudience::Specific => {
            voucher.specific_user_ids()?.contains(&ctx.user_id)
                || voucher
                    .specific_user_emails()?
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(&ctx.user_email))
        }
    };
    if !audience_ok {
        return Ok(Err(IneligibleReason::AudienceMismatch));
    }

    // 6. 商品/品类限制
    if !ctx.items.is_empty() {
        let excluded = voucher.excluded_products()?;
        if ctx.items.iter().any(|l| excluded.contains(&l.product_id)) {
            return Ok(Err(IneligibleReason::ExcludedProduct));
        }

        let applicable_products = voucher.applicable_products()?;
        let applicable_categories = voucher.applicable_categories()?;
        if !applicable_products.is_empty() || !applicable_categories.is_empty() {
            let intersects = ctx.items.iter().any(|l| {
                applicable_products.contains(&l.product_id)
                    || applicable_categories.contains(&l.category)
            });
            if !intersects {
                return Ok(Err(IneligibleReason::ProductNotApplicable));
            }
        }

        // 整单均为促销品时拒绝
        if voucher.no_sale_products && ctx.items.iter().all(|l| l.is_on_sale) {
            return Ok(Err(IneligibleReason::SaleItemsOnly));
        }
    }

    // 7. 叠加限制
    if voucher.no_stacking && !ctx.applied_codes.is_empty() {
        return Ok(Err(IneligibleReason::StackingNotAllowed));
    }

    let discount_amount = compute_discount(voucher, ctx.order_value, ctx.shipping_fee);
    let final_price = (ctx.order_value - discount_amount).max(0);

    Ok(Ok(EvaluatedDiscount {
        discount_amount,
        final_price,
    }))
}

#[derive(Clone)]
pub struct VoucherService {
    pool: SqlitePool,
}

impl VoucherService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_by_code(&self, code: &str) -> AppResult<Voucher> {
        let code = code.trim().to_uppercase();
        sqlx::query_as::<_, Voucher>("SELECT * FROM vouchers WHERE code = ?")
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Voucher {code} not found")))
    }

    /// 组装资格判定上下文：用户、分层、等级、历史使用次数、订单商品
    async fn load_context(
        &self,
        user_id: i64,
        voucher_id: i64,
        order_value: i64,
        product_ids: &[i64],
        applied_codes: Vec<String>,
    ) -> AppResult<EligibilityContext> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let order_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = ? AND status != 'cancelled'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let lifetime_points: Option<i64> =
            sqlx::query_scalar("SELECT lifetime_points FROM loyalty_accounts WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let prior_use_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM voucher_usages WHERE voucher_id = ? AND user_id = ?",
        )
        .bind(voucher_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let items = self.load_order_lines(product_ids).await?;

        let account_age_days = (Utc::now() - user.created_at).num_days();

        Ok(EligibilityContext {
            user_id,
            user_email: user.email,
            restricted: user.account_status == AccountStatus::Restricted,
            segment: CustomerSegment::classify(order_count, account_age_days),
            tier: LoyaltyTier::for_points(lifetime_points.unwrap_or(0)),
            account_age_days,
            prior_use_count,
            order_value,
            items,
            applied_codes,
            shipping_fee: FLAT_SHIPPING_FEE,
        })
    }

    async fn load_order_lines(&self, product_ids: &[i64]) -> AppResult<Vec<OrderLine>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; product_ids.len()].join(",");
        let sql = format!(
            "SELECT id, category, is_on_sale FROM products WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, (i64, String, bool)>(&sql);
        for id in product_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(product_id, category, is_on_sale)| OrderLine {
                product_id,
                category,
                is_on_sale,
            })
            .collect())
    }

    /// 校验券码并计算折扣。重复调用不改变任何使用计数。
    pub async fn validate(
        &self,
        user_id: i64,
        request: &ValidateVoucherRequest,
    ) -> AppResult<ValidateVoucherResponse> {
        if request.order_value <= 0 {
            return Err(AppError::ValidationError(
                "order_value must be positive".to_string(),
            ));
        }

        let voucher = match self.find_by_code(&request.code).await {
            Ok(v) => v,
            Err(AppError::NotFound(_)) => {
                return Ok(ValidateVoucherResponse {
                    valid: false,
                    message: Some("Voucher code does not exist".to_string()),
                    discount_amount: None,
                    final_price: None,
                });
            }
            Err(e) => return Err(e),
        };

        let ctx = self
            .load_context(
                user_id,
                voucher.id,
                request.order_value,
                request.product_ids.as_deref().unwrap_or(&[]),
                request.applied_codes.clone().unwrap_or_default(),
            )
            .await?;

        match evaluate_voucher(&voucher, &ctx, Utc::now())? {
            Ok(discount) => Ok(ValidateVoucherResponse {
                valid: true,
                message: None,
                discount_amount: Some(discount.discount_amount),
                final_price: Some(discount.final_price),
            }),
            Err(reason) => Ok(ValidateVoucherResponse {
                valid: false,
                message: Some(reason.message()),
                discount_amount: None,
                final_price: None,
            }),
        }
    }

    /// 事务内核销：总量与单人限额都在事务内复核，
    /// 任一已满则整个事务失败，关闭并发核销超卖窗口。
    pub async fn record_usage_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        voucher_id: i64,
        user_id: i64,
        order_id: i64,
        discount_amount: i64,
        order_value: i64,
    ) -> AppResult<()> {
        let max_usage_per_user: i64 =
            sqlx::query_scalar("SELECT max_usage_per_user FROM vouchers WHERE id = ?")
                .bind(voucher_id)
                .fetch_one(&mut **tx)
                .await?;
        let prior_use_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM voucher_usages WHERE voucher_id = ? AND user_id = ?",
        )
        .bind(voucher_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await?;
        if per_user_cap_reached(prior_use_count, max_usage_per_user) {
            return Err(AppError::ValidationError(
                IneligibleReason::PerUserLimitReached.message(),
            ));
        }

        let updated = sqlx::query(
            r#"
            UPDATE vouchers
            SET current_usage = current_usage + 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND current_usage < max_usage_total
            "#,
        )
        .bind(voucher_id)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::ValidationError(
                "This voucher has reached its usage limit".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO voucher_usages (voucher_id, user_id, order_id, discount_amount, order_value)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(voucher_id)
        .bind(user_id)
        .bind(order_id)
        .bind(discount_amount)
        .bind(order_value)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn record_usage(&self, request: &RecordUsageRequest) -> AppResult<()> {
        let voucher = self.find_by_code(&request.voucher_code).await?;

        let mut tx = self.pool.begin().await?;
        Self::record_usage_in_tx(
            &mut tx,
            voucher.id,
            request.user_id,
            request.order_id,
            request.discount_amount,
            request.order_value,
        )
        .await?;
        tx.commit().await?;

        Ok(())
    }

    /// 当前对用户可见的券：公开生效中的，加上定向到该用户的
    pub async fn list_available(&self, user_id: i64, email: &str) -> AppResult<Vec<VoucherResponse>> {
        let now = Utc::now();
        let vouchers = sqlx::query_as::<_, Voucher>(
            "SELECT * FROM vouchers WHERE is_active = 1 AND starts_at <= ? AND ends_at >= ?",
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut visible = Vec::new();
        for v in vouchers {
            if v.is_public {
                visible.push(VoucherResponse::from(v));
                continue;
            }
            let targeted = v.specific_user_ids()?.contains(&user_id)
                || v.specific_user_emails()?
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(email));
            if targeted {
                visible.push(VoucherResponse::from(v));
            }
        }

        Ok(visible)
    }

    // ---- 管理端 ----

    pub async fn create_voucher(&self, request: CreateVoucherRequest) -> AppResult<VoucherResponse> {
        let code = request.code.trim().to_uppercase();
        if code.is_empty() {
            return Err(AppError::ValidationError(
                "Voucher code must not be empty".to_string(),
            ));
        }
        if request.ends_at <= request.starts_at {
            return Err(AppError::ValidationError(
                "ends_at must be after starts_at".to_string(),
            ));
        }
        if request.voucher_type == VoucherType::Percentage
            && !(1..=100).contains(&request.value)
        {
            return Err(AppError::ValidationError(
                "Percentage value must be between 1 and 100".to_string(),
            ));
        }
        if request.max_usage_total <= 0 {
            return Err(AppError::ValidationError(
                "max_usage_total must be positive".to_string(),
            ));
        }

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM vouchers WHERE code = ?")
            .bind(&code)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(AppError::ValidationError(format!(
                "Voucher code {code} already exists"
            )));
        }

        fn to_json<T: serde::Serialize>(v: &Option<Vec<T>>) -> AppResult<Option<String>> {
            match v {
                Some(list) if !list.is_empty() => Ok(Some(serde_json::to_string(list)?)),
                _ => Ok(None),
            }
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO vouchers (
                code, description, voucher_type, value, max_discount, min_order_value,
                starts_at, ends_at, max_usage_total, max_usage_per_user,
                target_audience, target_tiers, specific_user_ids, specific_user_emails,
                applicable_products, applicable_categories, excluded_products,
                no_stacking, no_sale_products, is_public
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&code)
        .bind(&request.description)
        .bind(request.voucher_type)
        .bind(request.value)
        .bind(request.max_discount)
        .bind(request.min_order_value)
        .bind(request.starts_at)
        .bind(request.ends_at)
        .bind(request.max_usage_total)
        .bind(request.max_usage_per_user.unwrap_or(1))
        .bind(request.target_audience.unwrap_or(TargetAudience::All))
        .bind(to_json(&request.target_tiers)?)
        .bind(to_json(&request.specific_user_ids)?)
        .bind(to_json(&request.specific_user_emails)?)
        .bind(to_json(&request.applicable_products)?)
        .bind(to_json(&request.applicable_categories)?)
        .bind(to_json(&request.excluded_products)?)
        .bind(request.no_stacking.unwrap_or(false))
        .bind(request.no_sale_products.unwrap_or(false))
        .bind(request.is_public.unwrap_or(true))
        .fetch_one(&self.pool)
        .await?;

        let voucher = sqlx::query_as::<_, Voucher>("SELECT * FROM vouchers WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        log::info!("Voucher {} created (id={id})", voucher.code);
        Ok(VoucherResponse::from(voucher))
    }

    pub async fn update_voucher(
        &self,
        voucher_id: i64,
        request: UpdateVoucherRequest,
    ) -> AppResult<VoucherResponse> {
        let voucher = sqlx::query_as::<_, Voucher>("SELECT * FROM vouchers WHERE id = ?")
            .bind(voucher_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Voucher not found".to_string()))?;

        let new_max_total = request.max_usage_total.unwrap_or(voucher.max_usage_total);
        if new_max_total < voucher.current_usage {
            return Err(AppError::ValidationError(
                "max_usage_total cannot be lower than current usage".to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE vouchers SET
                description = COALESCE(?, description),
                value = COALESCE(?, value),
                max_discount = COALESCE(?, max_discount),
                min_order_value = COALESCE(?, min_order_value),
                starts_at = COALESCE(?, starts_at),
                ends_at = COALESCE(?, ends_at),
                max_usage_total = COALESCE(?, max_usage_total),
                max_usage_per_user = COALESCE(?, max_usage_per_user),
                is_active = COALESCE(?, is_active),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(&request.description)
        .bind(request.value)
        .bind(request.max_discount)
        .bind(request.min_order_value)
        .bind(request.starts_at)
        .bind(request.ends_at)
        .bind(request.max_usage_total)
        .bind(request.max_usage_per_user)
        .bind(request.is_active)
        .bind(voucher_id)
        .execute(&self.pool)
        .await?;

        let updated = sqlx::query_as::<_, Voucher>("SELECT * FROM vouchers WHERE id = ?")
            .bind(voucher_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(VoucherResponse::from(updated))
    }

    pub async fn delete_voucher(&self, voucher_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM vouchers WHERE id = ?")
            .bind(voucher_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Voucher not found".to_string()));
        }

        log::info!("Voucher id={voucher_id} deleted");
        Ok(())
    }

    /// 状态是派生值，无法下推到 SQL 的 LIMIT/OFFSET，
    /// 先全量过滤再分页，total 统计过滤后的集合
    pub async fn list_vouchers(
        &self,
        query: &VoucherQuery,
    ) -> AppResult<PaginatedResponse<VoucherResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let vouchers =
            sqlx::query_as::<_, Voucher>("SELECT * FROM vouchers ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;

        let responses = vouchers.into_iter().map(VoucherResponse::from).collect();
        let (total, items) = page_by_status(responses, query.status.as_deref(), &params);

        Ok(PaginatedResponse::new(items, &params, total))
    }

    pub async fn usage_report(&self, voucher_id: i64) -> AppResult<Vec<VoucherUsage>> {
        let usages = sqlx::query_as::<_, VoucherUsage>(
            "SELECT * FROM voucher_usages WHERE voucher_id = ? ORDER BY used_at DESC",
        )
        .bind(voucher_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(usages)
    }
}

fn page_by_status(
    vouchers: Vec<VoucherResponse>,
    status: Option<&str>,
    params: &PaginationParams,
) -> (i64, Vec<VoucherResponse>) {
    let filtered: Vec<VoucherResponse> = vouchers
        .into_iter()
        .filter(|v| match status {
            Some(s) => v.status.as_str() == s,
            None => true,
        })
        .collect();

    let total = filtered.len() as i64;
    let items = filtered
        .into_iter()
        .skip(params.get_offset() as usize)
        .take(params.get_limit() as usize)
        .collect();

    (total, items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_voucher() -> Voucher {
        let now = Utc::now();
        Voucher {
            id: 1,
            code: "SALE10".to_string(),
            description: None,
            voucher_type: VoucherType::Percentage,
            value: 10,
            max_discount: Some(50_000),
            min_order_value: 200_000,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(30),
            max_usage_total: 100,
            max_usage_per_user: 1,
            current_usage: 0,
            target_audience: TargetAudience::All,
            target_tiers: None,
            specific_user_ids: None,
            specific_user_emails: None,
            applicable_products: None,
            applicable_categories: None,
            excluded_products: None,
            no_stacking: false,
            no_sale_products: false,
            is_public: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn base_ctx(order_value: i64) -> EligibilityContext {
        EligibilityContext {
            user_id: 42,
            user_email: "lan.nguyen@example.com".to_string(),
            restricted: false,
            segment: CustomerSegment::Regular,
            tier: LoyaltyTier::Silver,
            account_age_days: 120,
            prior_use_count: 0,
            order_value,
            items: Vec::new(),
            applied_codes: Vec::new(),
            shipping_fee: FLAT_SHIPPING_FEE,
        }
    }

    fn line(product_id: i64, category: &str, is_on_sale: bool) -> OrderLine {
        OrderLine {
            product_id,
            category: category.to_string(),
            is_on_sale,
        }
    }

    #[test]
    fn test_sale10_scenario() {
        // 10%, 封顶 50.000, 订单 1.000.000 -> 折扣 50.000, 实付 950.000
        let voucher = base_voucher();
        let ctx = base_ctx(1_000_000);
        let outcome = evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap();
        let discount = outcome.unwrap();
        assert_eq!(discount.discount_amount, 50_000);
        assert_eq!(discount.final_price, 950_000);
    }

    #[test]
    fn test_percentage_below_cap() {
        let voucher = base_voucher();
        let ctx = base_ctx(300_000);
        let discount = evaluate_voucher(&voucher, &ctx, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(discount.discount_amount, 30_000);
    }

    #[test]
    fn test_date_window_rejections() {
        let mut voucher = base_voucher();
        let ctx = base_ctx(1_000_000);

        voucher.starts_at = Utc::now() + Duration::days(1);
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::NotStarted)
        );

        let mut voucher = base_voucher();
        voucher.ends_at = Utc::now() - Duration::hours(1);
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::Expired)
        );

        let mut voucher = base_voucher();
        voucher.is_active = false;
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::NotActive)
        );
    }

    #[test]
    fn test_usage_limits() {
        let mut voucher = base_voucher();
        voucher.current_usage = voucher.max_usage_total;
        let ctx = base_ctx(1_000_000);
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::UsageLimitReached)
        );

        // 单人上限：已有一条使用记录
        let voucher = base_voucher();
        let mut ctx = base_ctx(1_000_000);
        ctx.prior_use_count = 1;
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::PerUserLimitReached)
        );
    }

    #[test]
    fn test_min_order_shortfall_message() {
        let voucher = base_voucher();
        let ctx = base_ctx(150_000);
        let reason = evaluate_voucher(&voucher, &ctx, Utc::now())
            .unwrap()
            .unwrap_err();
        assert_eq!(reason, IneligibleReason::MinOrderNotMet { shortfall: 50_000 });
        assert!(reason.message().contains("50.000₫"));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_order_value() {
        let mut voucher = base_voucher();
        voucher.voucher_type = VoucherType::Fixed;
        voucher.value = 500_000;
        voucher.min_order_value = 0;
        let ctx = base_ctx(300_000);
        let discount = evaluate_voucher(&voucher, &ctx, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(discount.discount_amount, 300_000);
        assert_eq!(discount.final_price, 0);
    }

    #[test]
    fn test_freeship_discount_is_shipping_fee() {
        let mut voucher = base_voucher();
        voucher.voucher_type = VoucherType::Freeship;
        voucher.value = 0;
        let ctx = base_ctx(500_000);
        let discount = evaluate_voucher(&voucher, &ctx, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(discount.discount_amount, FLAT_SHIPPING_FEE);
    }

    #[test]
    fn test_restricted_account_rejected_first() {
        // 行政拦截优先于其他规则，即便券本身已过期
        let mut voucher = base_voucher();
        voucher.ends_at = Utc::now() - Duration::days(1);
        let mut ctx = base_ctx(1_000_000);
        ctx.restricted = true;
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::AccountRestricted)
        );
    }

    #[test]
    fn test_segment_targeting() {
        let mut voucher = base_voucher();
        voucher.target_audience = TargetAudience::Vip;
        let ctx = base_ctx(1_000_000);
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::AudienceMismatch)
        );

        let mut ctx = base_ctx(1_000_000);
        ctx.segment = CustomerSegment::Vip;
        assert!(evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap().is_ok());
    }

    #[test]
    fn test_tier_targeting() {
        let mut voucher = base_voucher();
        voucher.target_audience = TargetAudience::Tier;
        voucher.target_tiers = Some(r#"["gold","platinum"]"#.to_string());

        let ctx = base_ctx(1_000_000); // silver
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::AudienceMismatch)
        );

        let mut ctx = base_ctx(1_000_000);
        ctx.tier = LoyaltyTier::Gold;
        assert!(evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap().is_ok());
    }

    #[test]
    fn test_specific_targeting_by_id_and_email() {
        let mut voucher = base_voucher();
        voucher.target_audience = TargetAudience::Specific;
        voucher.specific_user_ids = Some("[7]".to_string());
        voucher.specific_user_emails = Some(r#"["Lan.Nguyen@example.com"]"#.to_string());

        // 邮箱匹配（大小写不敏感）
        let ctx = base_ctx(1_000_000);
        assert!(evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap().is_ok());

        let mut ctx = base_ctx(1_000_000);
        ctx.user_email = "other@example.com".to_string();
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::AudienceMismatch)
        );

        // ID 匹配
        let mut ctx = base_ctx(1_000_000);
        ctx.user_id = 7;
        ctx.user_email = "other@example.com".to_string();
        assert!(evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap().is_ok());
    }

    #[test]
    fn test_long_term_targeting() {
        let mut voucher = base_voucher();
        voucher.target_audience = TargetAudience::LongTerm;

        let ctx = base_ctx(1_000_000); // 账龄 120 天
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::AudienceMismatch)
        );

        let mut ctx = base_ctx(1_000_000);
        ctx.account_age_days = 900;
        assert!(evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap().is_ok());
    }

    #[test]
    fn test_product_restrictions() {
        let mut voucher = base_voucher();
        voucher.applicable_categories = Some(r#"["dresses"]"#.to_string());

        let mut ctx = base_ctx(1_000_000);
        ctx.items = vec![line(1, "shirts", false)];
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::ProductNotApplicable)
        );

        // 任一商品落入适用品类即可
        ctx.items = vec![line(1, "shirts", false), line(2, "dresses", false)];
        assert!(evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap().is_ok());
    }

    #[test]
    fn test_excluded_products() {
        let mut voucher = base_voucher();
        voucher.excluded_products = Some("[9]".to_string());

        let mut ctx = base_ctx(1_000_000);
        ctx.items = vec![line(9, "shirts", false), line(2, "dresses", false)];
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::ExcludedProduct)
        );
    }

    #[test]
    fn test_no_sale_products_rejects_all_sale_cart() {
        let mut voucher = base_voucher();
        voucher.no_sale_products = true;

        let mut ctx = base_ctx(1_000_000);
        ctx.items = vec![line(1, "shirts", true), line(2, "dresses", true)];
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::SaleItemsOnly)
        );

        // 混合购物车不拒绝
        ctx.items = vec![line(1, "shirts", true), line(2, "dresses", false)];
        assert!(evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap().is_ok());
    }

    #[test]
    fn test_no_stacking() {
        let mut voucher = base_voucher();
        voucher.no_stacking = true;

        let mut ctx = base_ctx(1_000_000);
        ctx.applied_codes = vec!["FREESHIP".to_string()];
        assert_eq!(
            evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap(),
            Err(IneligibleReason::StackingNotAllowed)
        );
    }

    #[test]
    fn test_evaluate_does_not_mutate_voucher() {
        let voucher = base_voucher();
        let ctx = base_ctx(1_000_000);
        let before = voucher.current_usage;
        for _ in 0..5 {
            let _ = evaluate_voucher(&voucher, &ctx, Utc::now()).unwrap();
        }
        assert_eq!(voucher.current_usage, before);
    }

    #[test]
    fn test_compute_discount_percentage_floor() {
        let mut voucher = base_voucher();
        voucher.value = 7;
        voucher.max_discount = None;
        // 7% of 333 -> 23.31, 向下取整
        assert_eq!(compute_discount(&voucher, 333, 0), 23);
    }

    #[test]
    fn test_per_user_cap_rule() {
        assert!(!per_user_cap_reached(0, 1));
        assert!(per_user_cap_reached(1, 1));
        assert!(per_user_cap_reached(3, 2));
    }

    #[test]
    fn test_page_by_status_filters_before_pagination() {
        // 20 张停用券在前(更新创建)，5 张生效券在后
        let mut all = Vec::new();
        for i in 0..20 {
            let mut v = base_voucher();
            v.id = 100 + i;
            v.is_active = false;
            all.push(VoucherResponse::from(v));
        }
        for i in 1..=5 {
            let mut v = base_voucher();
            v.id = i;
            all.push(VoucherResponse::from(v));
        }

        let params = PaginationParams::new(Some(1), Some(20));
        let (total, items) = page_by_status(all, Some("active"), &params);

        // 第一页就能看到全部生效券，total 只数过滤后的
        assert_eq!(total, 5);
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|v| v.status == VoucherStatus::Active));
    }

    #[test]
    fn test_page_by_status_without_filter_keeps_all() {
        let all: Vec<VoucherResponse> = (1..=3)
            .map(|i| {
                let mut v = base_voucher();
                v.id = i;
                VoucherResponse::from(v)
            })
            .collect();

        let params = PaginationParams::new(Some(1), Some(2));
        let (total, items) = page_by_status(all, None, &params);
        assert_eq!(total, 3);
        assert_eq!(items.len(), 2);
    }
}
