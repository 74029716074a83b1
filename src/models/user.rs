use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
pub enum UserRole {
    #[serde(rename = "customer")]
    Customer,
    #[serde(rename = "admin")]
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Customer => write!(f, "customer"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(UserRole::Customer),
            "admin" => Ok(UserRole::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
pub enum AccountStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "restricted")]
    Restricted,
}

/// 客户分层：按订单数与账龄划分，与积分等级是两条独立的轴
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    New,
    Regular,
    Loyal,
    Vip,
}

impl CustomerSegment {
    pub const VIP_MIN_ORDERS: i64 = 20;
    pub const LOYAL_MIN_AGE_DAYS: i64 = 365;
    pub const NEW_MAX_AGE_DAYS: i64 = 30;
    pub const LONG_TERM_MIN_AGE_DAYS: i64 = 730;

    /// 订单数优先于账龄（VIP 优先判定）
    pub fn classify(order_count: i64, account_age_days: i64) -> Self {
        if order_count >= Self::VIP_MIN_ORDERS {
            CustomerSegment::Vip
        } else if account_age_days >= Self::LOYAL_MIN_AGE_DAYS {
            CustomerSegment::Loyal
        } else if account_age_days <= Self::NEW_MAX_AGE_DAYS {
            CustomerSegment::New
        } else {
            CustomerSegment::Regular
        }
    }
}

impl std::fmt::Display for CustomerSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustomerSegment::New => write!(f, "new"),
            CustomerSegment::Regular => write!(f, "regular"),
            CustomerSegment::Loyal => write!(f, "loyal"),
            CustomerSegment::Vip => write!(f, "vip"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub account_status: AccountStatus,
    pub referral_code: Option<String>,
    pub referred_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "lan.nguyen@example.com")]
    pub email: String,
    #[schema(example = "Password123")]
    pub password: String,
    #[schema(example = "Nguyễn Thị Lan")]
    pub full_name: String,
    pub phone: Option<String>,
    #[schema(example = "VL7KQ2MD")]
    pub referral_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "lan.nguyen@example.com")]
    pub email: String,
    #[schema(example = "Password123")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetAccountStatusRequest {
    pub account_status: AccountStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub account_status: AccountStatus,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub segment: CustomerSegment,
    pub order_count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
            role: user.role,
            account_status: user.account_status,
            referral_code: user.referral_code,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_vip_by_order_count() {
        assert_eq!(CustomerSegment::classify(20, 10), CustomerSegment::Vip);
        assert_eq!(CustomerSegment::classify(35, 1000), CustomerSegment::Vip);
    }

    #[test]
    fn test_segment_loyal_by_account_age() {
        assert_eq!(CustomerSegment::classify(5, 365), CustomerSegment::Loyal);
        assert_eq!(CustomerSegment::classify(0, 800), CustomerSegment::Loyal);
    }

    #[test]
    fn test_segment_new_and_regular() {
        assert_eq!(CustomerSegment::classify(1, 10), CustomerSegment::New);
        assert_eq!(CustomerSegment::classify(1, 30), CustomerSegment::New);
        assert_eq!(CustomerSegment::classify(1, 31), CustomerSegment::Regular);
        assert_eq!(CustomerSegment::classify(19, 364), CustomerSegment::Regular);
    }
}
