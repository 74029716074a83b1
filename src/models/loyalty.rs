use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// 积分等级，由累计积分对照阈值表派生，每次读取重算
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

pub const TIER_THRESHOLDS: [(LoyaltyTier, i64); 5] = [
    (LoyaltyTier::Bronze, 0),
    (LoyaltyTier::Silver, 2_000),
    (LoyaltyTier::Gold, 5_000),
    (LoyaltyTier::Platinum, 10_000),
    (LoyaltyTier::Diamond, 20_000),
];

impl LoyaltyTier {
    pub fn for_points(lifetime_points: i64) -> Self {
        let mut tier = LoyaltyTier::Bronze;
        for (candidate, threshold) in TIER_THRESHOLDS {
            if lifetime_points >= threshold {
                tier = candidate;
            }
        }
        tier
    }

    pub fn threshold(&self) -> i64 {
        TIER_THRESHOLDS
            .iter()
            .find(|(t, _)| t == self)
            .map(|(_, p)| *p)
            .unwrap_or(0)
    }

    pub fn next(&self) -> Option<LoyaltyTier> {
        match self {
            LoyaltyTier::Bronze => Some(LoyaltyTier::Silver),
            LoyaltyTier::Silver => Some(LoyaltyTier::Gold),
            LoyaltyTier::Gold => Some(LoyaltyTier::Platinum),
            LoyaltyTier::Platinum => Some(LoyaltyTier::Diamond),
            LoyaltyTier::Diamond => None,
        }
    }
}

impl std::fmt::Display for LoyaltyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoyaltyTier::Bronze => write!(f, "bronze"),
            LoyaltyTier::Silver => write!(f, "silver"),
            LoyaltyTier::Gold => write!(f, "gold"),
            LoyaltyTier::Platinum => write!(f, "platinum"),
            LoyaltyTier::Diamond => write!(f, "diamond"),
        }
    }
}

/// 距下一等级的进度百分比（最高级恒为100）
pub fn tier_progress(lifetime_points: i64) -> (u32, Option<i64>) {
    let tier = LoyaltyTier::for_points(lifetime_points);
    match tier.next() {
        Some(next) => {
            let current = tier.threshold();
            let span = next.threshold() - current;
            let progress = ((lifetime_points - current) * 100 / span).clamp(0, 100) as u32;
            (progress, Some(next.threshold() - lifetime_points))
        }
        None => (100, None),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PointTransactionType {
    Earn,
    Redeem,
    Expire,
    Bonus,
    Refund,
}

impl std::fmt::Display for PointTransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointTransactionType::Earn => write!(f, "earn"),
            PointTransactionType::Redeem => write!(f, "redeem"),
            PointTransactionType::Expire => write!(f, "expire"),
            PointTransactionType::Bonus => write!(f, "bonus"),
            PointTransactionType::Refund => write!(f, "refund"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoyaltyAccount {
    pub id: i64,
    pub user_id: i64,
    pub current_points: i64,
    pub lifetime_points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 积分流水，只追加；余额变更必须与流水同事务写入
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PointTransaction {
    pub id: i64,
    pub user_id: i64,
    pub transaction_type: PointTransactionType,
    pub points: i64, // 带符号
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Discount,
    Gift,
}

impl RewardType {
    /// 兑换汇率(越南盾/积分)
    pub fn vnd_per_point(&self) -> i64 {
        match self {
            RewardType::Discount => 100,
            RewardType::Gift => 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PointsResponse {
    pub current_points: i64,
    pub lifetime_points: i64,
    pub tier: LoyaltyTier,
    pub tier_progress: u32,
    pub next_tier_points: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemPointsRequest {
    #[schema(example = 500)]
    pub points: i64,
    pub reward_type: RewardType,
    pub reward_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemedReward {
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub value: i64,
    pub points_used: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemPointsResponse {
    pub transaction: PointTransaction,
    pub reward: RedeemedReward,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewBonusRequest {
    pub order_id: i64,
    #[schema(example = 2)]
    pub photo_count: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PointTransactionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// 评价积分: 基础50 + 每张图25(最多3张) + 7天内评价加速奖励50
pub fn review_points(photo_count: u32, days_since_delivery: i64) -> i64 {
    let photos = photo_count.min(3) as i64 * 25;
    let speed_bonus = if days_since_delivery <= 7 { 50 } else { 0 };
    50 + photos + speed_bonus
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(LoyaltyTier::for_points(0), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(1_999), LoyaltyTier::Bronze);
        assert_eq!(LoyaltyTier::for_points(2_000), LoyaltyTier::Silver);
        assert_eq!(LoyaltyTier::for_points(5_000), LoyaltyTier::Gold);
        assert_eq!(LoyaltyTier::for_points(10_000), LoyaltyTier::Platinum);
        assert_eq!(LoyaltyTier::for_points(19_999), LoyaltyTier::Platinum);
        assert_eq!(LoyaltyTier::for_points(20_000), LoyaltyTier::Diamond);
        assert_eq!(LoyaltyTier::for_points(1_000_000), LoyaltyTier::Diamond);
    }

    #[test]
    fn test_tier_is_monotonic() {
        let mut last = LoyaltyTier::Bronze;
        for points in (0..25_000).step_by(100) {
            let tier = LoyaltyTier::for_points(points);
            assert!(tier >= last, "tier decreased at {points} points");
            last = tier;
        }
    }

    #[test]
    fn test_tier_progress() {
        // bronze 0..2000
        let (progress, next) = tier_progress(1_000);
        assert_eq!(progress, 50);
        assert_eq!(next, Some(1_000));

        // 最高级
        let (progress, next) = tier_progress(50_000);
        assert_eq!(progress, 100);
        assert_eq!(next, None);
    }

    #[test]
    fn test_review_points_breakdown() {
        assert_eq!(review_points(0, 30), 50); // 无图慢评
        assert_eq!(review_points(0, 3), 100); // 快评奖励
        assert_eq!(review_points(2, 30), 100); // 两张图
        assert_eq!(review_points(3, 1), 175); // 满配
        assert_eq!(review_points(10, 1), 175); // 图片数量封顶
    }
}
