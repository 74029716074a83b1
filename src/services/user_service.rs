use crate::error::{AppError, AppResult};
use crate::models::*;
use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
}

impl UserService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_user(&self, user_id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// 画像接口：基础资料加上客户分层与有效订单数
    pub async fn get_profile(&self, user_id: i64) -> AppResult<ProfileResponse> {
        let user = self.get_user(user_id).await?;

        let order_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = ? AND status != 'cancelled'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let account_age_days = (Utc::now() - user.created_at).num_days();
        let segment = CustomerSegment::classify(order_count, account_age_days);

        Ok(ProfileResponse {
            user: user.into(),
            segment,
            order_count,
        })
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        request: UpdateProfileRequest,
    ) -> AppResult<ProfileResponse> {
        if let Some(name) = &request.full_name
            && name.trim().is_empty()
        {
            return Err(AppError::ValidationError(
                "Full name cannot be empty".to_string(),
            ));
        }

        sqlx::query(
            r#"
            UPDATE users
            SET full_name = COALESCE(?, full_name),
                phone = COALESCE(?, phone),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(request.full_name.as_deref().map(str::trim))
        .bind(&request.phone)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.get_profile(user_id).await
    }

    /// 管理端：标记/解除受限账户（受限用户不可用公开券）
    pub async fn set_account_status(
        &self,
        user_id: i64,
        status: AccountStatus,
    ) -> AppResult<UserResponse> {
        let result = sqlx::query(
            "UPDATE users SET account_status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&status)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        log::info!("User {user_id} account status set to {status:?}");
        Ok(self.get_user(user_id).await?.into())
    }
}
