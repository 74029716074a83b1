use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::loyalty_service::{LoyaltyService, REGISTRATION_BONUS};
use crate::services::outbox_service::OutboxService;
use crate::utils::{
    JwtService, generate_voucher_code, hash_password, validate_email, validate_password,
    verify_password,
};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(pool: SqlitePool, jwt_service: JwtService) -> Self {
        Self { pool, jwt_service }
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_lowercase();
        validate_email(&email)?;
        validate_password(&request.password)?;
        if request.full_name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Full name is required".to_string(),
            ));
        }

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(&email)
            .fetch_one(&self.pool)
            .await?;
        if existing > 0 {
            return Err(AppError::ValidationError(
                "Email is already registered".to_string(),
            ));
        }

        // 推荐码无效时整个注册拒绝，避免静默吞掉用户的输入
        let referred_by = match request.referral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let referrer_id: Option<i64> =
                    sqlx::query_scalar("SELECT id FROM users WHERE referral_code = ?")
                        .bind(code.to_uppercase())
                        .fetch_optional(&self.pool)
                        .await?;
                Some(referrer_id.ok_or_else(|| {
                    AppError::ValidationError("Unknown referral code".to_string())
                })?)
            }
            _ => None,
        };

        let password_hash = hash_password(&request.password)?;
        let referral_code = generate_voucher_code();

        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, full_name, phone, referral_code, referred_by)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&email)
        .bind(&password_hash)
        .bind(request.full_name.trim())
        .bind(&request.phone)
        .bind(&referral_code)
        .bind(referred_by)
        .fetch_one(&mut *tx)
        .await?;

        LoyaltyService::apply_points_in_tx(
            &mut tx,
            user.id,
            PointTransactionType::Bonus,
            REGISTRATION_BONUS,
            "Registration bonus",
            None,
        )
        .await?;

        OutboxService::enqueue_in_tx(
            &mut tx,
            &user.email,
            "Welcome to Velora",
            &format!(
                "Hi {}, your account is ready. You start with {REGISTRATION_BONUS} loyalty points.",
                user.full_name
            ),
        )
        .await?;

        tx.commit().await?;

        log::info!("User {} registered (id={})", user.email, user.id);
        self.build_auth_response(user)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_lowercase();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AppError::AuthError(
                "Invalid email or password".to_string(),
            ));
        }

        log::info!("User {} logged in", user.email);
        self.build_auth_response(user)
    }

    pub async fn refresh(&self, request: RefreshRequest) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(&request.refresh_token)?;
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;

        self.build_auth_response(user)
    }

    fn build_auth_response(&self, user: User) -> AppResult<AuthResponse> {
        let role = user.role.to_string();
        let access_token = self.jwt_service.generate_access_token(user.id, &role)?;
        let refresh_token = self.jwt_service.generate_refresh_token(user.id, &role)?;

        Ok(AuthResponse {
            user: user.into(),
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }
}
