use crate::error::AppResult;
use crate::models::{CustomerSegment, LoyaltyTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    Percentage,
    Fixed,
    Freeship,
}

impl std::fmt::Display for VoucherType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoucherType::Percentage => write!(f, "percentage"),
            VoucherType::Fixed => write!(f, "fixed"),
            VoucherType::Freeship => write!(f, "freeship"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TargetAudience {
    All,
    New,
    Regular,
    Loyal,
    Vip,
    Tier,
    Specific,
    LongTerm,
}

/// 派生状态，不入库
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Upcoming,
    Active,
    Paused,
    Expired,
}

impl VoucherStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherStatus::Upcoming => "upcoming",
            VoucherStatus::Active => "active",
            VoucherStatus::Paused => "paused",
            VoucherStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Voucher {
    pub id: i64,
    pub code: String,
    pub description: Option<String>,
    pub voucher_type: VoucherType,
    pub value: i64,
    pub max_discount: Option<i64>,
    pub min_order_value: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_usage_total: i64,
    pub max_usage_per_user: i64,
    pub current_usage: i64,
    pub target_audience: TargetAudience,
    // 列表字段以 JSON 文本入库
    pub target_tiers: Option<String>,
    pub specific_user_ids: Option<String>,
    pub specific_user_emails: Option<String>,
    pub applicable_products: Option<String>,
    pub applicable_categories: Option<String>,
    pub excluded_products: Option<String>,
    pub no_stacking: bool,
    pub no_sale_products: bool,
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn parse_json_list<T: serde::de::DeserializeOwned>(raw: &Option<String>) -> AppResult<Vec<T>> {
    match raw {
        Some(s) if !s.is_empty() => Ok(serde_json::from_str(s)?),
        _ => Ok(Vec::new()),
    }
}

impl Voucher {
    pub fn status(&self, now: DateTime<Utc>) -> VoucherStatus {
        if !self.is_active {
            VoucherStatus::Paused
        } else if now < self.starts_at {
            VoucherStatus::Upcoming
        } else if now > self.ends_at {
            VoucherStatus::Expired
        } else {
            VoucherStatus::Active
        }
    }

    pub fn target_tiers(&self) -> AppResult<Vec<LoyaltyTier>> {
        parse_json_list(&self.target_tiers)
    }

    pub fn specific_user_ids(&self) -> AppResult<Vec<i64>> {
        parse_json_list(&self.specific_user_ids)
    }

    pub fn specific_user_emails(&self) -> AppResult<Vec<String>> {
        parse_json_list(&self.specific_user_emails)
    }

    pub fn applicable_products(&self) -> AppResult<Vec<i64>> {
        parse_json_list(&self.applicable_products)
    }

    pub fn applicable_categories(&self) -> AppResult<Vec<String>> {
        parse_json_list(&self.applicable_categories)
    }

    pub fn excluded_products(&self) -> AppResult<Vec<i64>> {
        parse_json_list(&self.excluded_products)
    }
}

/// 一次核销的不可变记录，按 (voucher_id, user_id) 统计单人使用次数
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct VoucherUsage {
    pub id: i64,
    pub voucher_id: i64,
    pub user_id: i64,
    pub order_id: i64,
    pub discount_amount: i64,
    pub order_value: i64,
    pub used_at: DateTime<Utc>,
}

/// 资格判定的全部输入，由服务层从数据库组装，规则本身是纯函数
#[derive(Debug, Clone)]
pub struct EligibilityContext {
    pub user_id: i64,
    pub user_email: String,
    pub restricted: bool,
    pub segment: CustomerSegment,
    pub tier: LoyaltyTier,
    pub account_age_days: i64,
    pub prior_use_count: i64,
    pub order_value: i64,
    pub items: Vec<OrderLine>,
    pub applied_codes: Vec<String>,
    pub shipping_fee: i64,
}

#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: i64,
    pub category: String,
    pub is_on_sale: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateVoucherRequest {
    #[schema(example = "SALE10")]
    pub code: String,
    pub description: Option<String>,
    pub voucher_type: VoucherType,
    pub value: i64,
    pub max_discount: Option<i64>,
    #[serde(default)]
    pub min_order_value: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_usage_total: i64,
    pub max_usage_per_user: Option<i64>,
    pub target_audience: Option<TargetAudience>,
    pub target_tiers: Option<Vec<LoyaltyTier>>,
    pub specific_user_ids: Option<Vec<i64>>,
    pub specific_user_emails: Option<Vec<String>>,
    pub applicable_products: Option<Vec<i64>>,
    pub applicable_categories: Option<Vec<String>>,
    pub excluded_products: Option<Vec<i64>>,
    pub no_stacking: Option<bool>,
    pub no_sale_products: Option<bool>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateVoucherRequest {
    pub description: Option<String>,
    pub value: Option<i64>,
    pub max_discount: Option<i64>,
    pub min_order_value: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_usage_total: Option<i64>,
    pub max_usage_per_user: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VoucherResponse {
    pub id: i64,
    pub code: String,
    pub description: Option<String>,
    pub voucher_type: VoucherType,
    pub value: i64,
    pub max_discount: Option<i64>,
    pub min_order_value: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub max_usage_total: i64,
    pub max_usage_per_user: i64,
    pub current_usage: i64,
    pub target_audience: TargetAudience,
    pub status: VoucherStatus,
    pub is_public: bool,
    pub is_active: bool,
}

impl From<Voucher> for VoucherResponse {
    fn from(v: Voucher) -> Self {
        let status = v.status(Utc::now());
        Self {
            id: v.id,
            code: v.code,
            description: v.description,
            voucher_type: v.voucher_type,
            value: v.value,
            max_discount: v.max_discount,
            min_order_value: v.min_order_value,
            starts_at: v.starts_at,
            ends_at: v.ends_at,
            max_usage_total: v.max_usage_total,
            max_usage_per_user: v.max_usage_per_user,
            current_usage: v.current_usage,
            target_audience: v.target_audience,
            status,
            is_public: v.is_public,
            is_active: v.is_active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateVoucherRequest {
    #[schema(example = "SALE10")]
    pub code: String,
    #[schema(example = 1000000)]
    pub order_value: i64,
    pub product_ids: Option<Vec<i64>>,
    /// 已应用于本单的其它券码，用于 no_stacking 判定
    pub applied_codes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateVoucherResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_price: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordUsageRequest {
    pub voucher_code: String,
    pub order_id: i64,
    pub user_id: i64,
    pub discount_amount: i64,
    pub order_value: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VoucherQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>, // upcoming/active/paused/expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn voucher(starts: i64, ends: i64, is_active: bool) -> Voucher {
        let now = Utc::now();
        Voucher {
            id: 1,
            code: "TEST".to_string(),
            description: None,
            voucher_type: VoucherType::Fixed,
            value: 10000,
            max_discount: None,
            min_order_value: 0,
            starts_at: now + Duration::days(starts),
            ends_at: now + Duration::days(ends),
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
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_windows() {
        let now = Utc::now();
        assert_eq!(voucher(-1, 1, true).status(now), VoucherStatus::Active);
        assert_eq!(voucher(1, 2, true).status(now), VoucherStatus::Upcoming);
        assert_eq!(voucher(-2, -1, true).status(now), VoucherStatus::Expired);
        assert_eq!(voucher(-1, 1, false).status(now), VoucherStatus::Paused);
    }

    #[test]
    fn test_json_list_fields() {
        let mut v = voucher(-1, 1, true);
        v.target_tiers = Some(r#"["gold","platinum"]"#.to_string());
        v.specific_user_ids = Some("[3,7]".to_string());
        assert_eq!(
            v.target_tiers().unwrap(),
            vec![LoyaltyTier::Gold, LoyaltyTier::Platinum]
        );
        assert_eq!(v.specific_user_ids().unwrap(), vec![3, 7]);
        // 空字段返回空列表
        assert!(v.applicable_products().unwrap().is_empty());
    }
}
