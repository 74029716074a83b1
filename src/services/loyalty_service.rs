use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::utils::generate_voucher_code;
use chrono::{Duration, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

/// 注册奖励积分
pub const REGISTRATION_BONUS: i64 = 100;
/// 推荐奖励积分
pub const REFERRAL_BONUS: i64 = 200;
/// 推荐奖励要求的被推荐人首单最低金额
pub const REFERRAL_MIN_ORDER_VALUE: i64 = 500_000;
/// 每满 1.000₫ 订单金额得 1 积分
pub const EARN_VND_PER_POINT: i64 = 1_000;
/// 积分兑换券的有效期(天)
const REDEEMED_VOUCHER_VALID_DAYS: i64 = 90;

/// 累计积分只随真实获得增长：redeem/expire 只扣可用余额，
/// refund 为负时回收已发放的积分（连带累计值）。
fn lifetime_delta(transaction_type: PointTransactionType, points: i64) -> i64 {
    match transaction_type {
        PointTransactionType::Earn | PointTransactionType::Bonus => points.max(0),
        PointTransactionType::Refund => points.min(0),
        PointTransactionType::Redeem | PointTransactionType::Expire => 0,
    }
}

/// 余额不允许为负，整笔变动要么生效要么拒绝
fn checked_balance(current: i64, delta: i64) -> AppResult<i64> {
    let next = current + delta;
    if next < 0 {
        return Err(AppError::ValidationError(
            "Insufficient loyalty points".to_string(),
        ));
    }
    Ok(next)
}

#[derive(Clone)]
pub struct LoyaltyService {
    pool: SqlitePool,
}

impl LoyaltyService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_points(&self, user_id: i64) -> AppResult<PointsResponse> {
        let account = self.get_or_create_account(user_id).await?;
        let tier = LoyaltyTier::for_points(account.lifetime_points);
        let (progress, next_tier_points) = tier_progress(account.lifetime_points);

        Ok(PointsResponse {
            current_points: account.current_points,
            lifetime_points: account.lifetime_points,
            tier,
            tier_progress: progress,
            next_tier_points,
        })
    }

    async fn get_or_create_account(&self, user_id: i64) -> AppResult<LoyaltyAccount> {
        sqlx::query("INSERT INTO loyalty_accounts (user_id) VALUES (?) ON CONFLICT(user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let account = sqlx::query_as::<_, LoyaltyAccount>(
            "SELECT * FROM loyalty_accounts WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    /// 事务内积分变动：余额更新与流水插入不可分割
    pub async fn apply_points_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
        transaction_type: PointTransactionType,
        points: i64,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<PointTransaction> {
        sqlx::query("INSERT INTO loyalty_accounts (user_id) VALUES (?) ON CONFLICT(user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        let current: i64 =
            sqlx::query_scalar("SELECT current_points FROM loyalty_accounts WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&mut **tx)
                .await?;

        checked_balance(current, points)?;

        sqlx::query(
            r#"
            UPDATE loyalty_accounts
            SET current_points = current_points + ?,
                lifetime_points = lifetime_points + ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ?
            "#,
        )
        .bind(points)
        .bind(lifetime_delta(transaction_type, points))
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        let transaction = sqlx::query_as::<_, PointTransaction>(
            r#"
            INSERT INTO point_transactions (user_id, transaction_type, points, reason, reference)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(transaction_type)
        .bind(points)
        .bind(reason)
        .bind(reference)
        .fetch_one(&mut **tx)
        .await?;

        Ok(transaction)
    }

    pub async fn earn_points(
        &self,
        user_id: i64,
        points: i64,
        transaction_type: PointTransactionType,
        reason: &str,
        reference: Option<&str>,
    ) -> AppResult<PointTransaction> {
        if points <= 0 {
            return Err(AppError::ValidationError(
                "Earned points must be positive".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let transaction =
            Self::apply_points_in_tx(&mut tx, user_id, transaction_type, points, reason, reference)
                .await?;
        tx.commit().await?;

        log::info!("User {user_id} earned {points} points ({reason})");
        Ok(transaction)
    }

    /// 兑换：余额不足整单拒绝。discount 兑换在同一事务内签发一张
    /// 仅限本人、单次使用的定向券。
    pub async fn redeem_points(
        &self,
        user_id: i64,
        request: RedeemPointsRequest,
    ) -> AppResult<RedeemPointsResponse> {
        if request.points <= 0 {
            return Err(AppError::ValidationError(
                "Redeemed points must be positive".to_string(),
            ));
        }

        let reward_value = request.points * request.reward_type.vnd_per_point();

        let mut tx = self.pool.begin().await?;

        let reference = request.reward_id.map(|id| format!("reward:{id}"));
        let transaction = Self::apply_points_in_tx(
            &mut tx,
            user_id,
            PointTransactionType::Redeem,
            -request.points,
            "Points redemption",
            reference.as_deref(),
        )
        .await?;

        let voucher_code = match request.reward_type {
            RewardType::Discount => {
                let code = generate_voucher_code();
                let now = Utc::now();
                sqlx::query(
                    r#"
                    INSERT INTO vouchers (
                        code, description, voucher_type, value, min_order_value,
                        starts_at, ends_at, max_usage_total, max_usage_per_user,
                        target_audience, specific_user_ids, is_public
                    ) VALUES (?, ?, 'fixed', ?, 0, ?, ?, 1, 1, 'specific', ?, 0)
                    "#,
                )
                .bind(&code)
                .bind(format!("Redeemed with {} points", request.points))
                .bind(reward_value)
                .bind(now)
                .bind(now + Duration::days(REDEEMED_VOUCHER_VALID_DAYS))
                .bind(format!("[{user_id}]"))
                .execute(&mut *tx)
                .await?;
                Some(code)
            }
            RewardType::Gift => None,
        };

        tx.commit().await?;

        log::info!(
            "User {user_id} redeemed {} points for {:?}",
            request.points,
            request.reward_type
        );

        Ok(RedeemPointsResponse {
            transaction,
            reward: RedeemedReward {
                reward_type: request.reward_type,
                value: reward_value,
                points_used: request.points,
                voucher_code,
            },
        })
    }

    /// 评价奖励：仅限本人已签收订单，每单一次
    pub async fn award_review_bonus(
        &self,
        user_id: i64,
        request: ReviewBonusRequest,
    ) -> AppResult<PointTransaction> {
        let delivered_at: Option<chrono::DateTime<Utc>> = sqlx::query_scalar(
            "SELECT delivered_at FROM orders WHERE id = ? AND user_id = ? AND status = 'delivered'",
        )
        .bind(request.order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        let delivered_at = delivered_at.ok_or_else(|| {
            AppError::ValidationError("Only delivered orders can be reviewed".to_string())
        })?;

        let reference = format!("review:{}", request.order_id);
        let already: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM point_transactions WHERE user_id = ? AND reference = ?",
        )
        .bind(user_id)
        .bind(&reference)
        .fetch_one(&self.pool)
        .await?;
        if already > 0 {
            return Err(AppError::ValidationError(
                "Review bonus already granted for this order".to_string(),
            ));
        }

        let days_since_delivery = (Utc::now() - delivered_at).num_days();
        let points = review_points(request.photo_count, days_since_delivery);

        self.earn_points(
            user_id,
            points,
            PointTransactionType::Bonus,
            "Review bonus",
            Some(&reference),
        )
        .await
    }

    pub async fn list_transactions(
        &self,
        user_id: i64,
        query: &PointTransactionQuery,
    ) -> AppResult<PaginatedResponse<PointTransaction>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM point_transactions WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let transactions = sqlx::query_as::<_, PointTransaction>(
            r#"
            SELECT * FROM point_transactions
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(params.get_limit() as i64)
        .bind(params.get_offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(PaginatedResponse::new(transactions, &params, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_delta_rules() {
        // 获得与奖励计入累计
        assert_eq!(lifetime_delta(PointTransactionType::Earn, 500), 500);
        assert_eq!(lifetime_delta(PointTransactionType::Bonus, 100), 100);
        // 兑换与过期只扣余额
        assert_eq!(lifetime_delta(PointTransactionType::Redeem, -500), 0);
        assert_eq!(lifetime_delta(PointTransactionType::Expire, -200), 0);
        // 退货回收连带累计
        assert_eq!(lifetime_delta(PointTransactionType::Refund, -300), -300);
        // 退款补偿积分不计入累计
        assert_eq!(lifetime_delta(PointTransactionType::Refund, 300), 0);
    }

    #[test]
    fn test_checked_balance() {
        // 兑换到零可行，再次兑换被拒
        assert_eq!(checked_balance(500, -500).unwrap(), 0);
        assert!(checked_balance(0, -1).is_err());
        assert_eq!(checked_balance(0, 100).unwrap(), 100);
    }

    #[test]
    fn test_reward_exchange_rate() {
        assert_eq!(RewardType::Discount.vnd_per_point() * 500, 50_000);
        assert_eq!(RewardType::Gift.vnd_per_point() * 500, 50_000);
    }

    #[test]
    fn test_order_earn_rate() {
        assert_eq!(950_000 / EARN_VND_PER_POINT, 950);
        assert_eq!(999 / EARN_VND_PER_POINT, 0);
    }
}
