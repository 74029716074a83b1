use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl ReturnStatus {
    pub fn allowed_transitions(&self) -> &'static [ReturnStatus] {
        match self {
            ReturnStatus::Pending => &[
                ReturnStatus::Approved,
                ReturnStatus::Rejected,
                ReturnStatus::Cancelled,
            ],
            ReturnStatus::Approved => &[ReturnStatus::Completed, ReturnStatus::Cancelled],
            ReturnStatus::Rejected => &[],
            ReturnStatus::Completed => &[],
            ReturnStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: ReturnStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// 拒绝信息点名当前状态与目标状态
    pub fn transition_error(&self, requested: ReturnStatus) -> String {
        format!("Invalid status transition from {self} to {requested}")
    }
}

impl std::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnStatus::Pending => write!(f, "pending"),
            ReturnStatus::Approved => write!(f, "approved"),
            ReturnStatus::Rejected => write!(f, "rejected"),
            ReturnStatus::Completed => write!(f, "completed"),
            ReturnStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    Points,
    BankTransfer,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReturnRequest {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub status: ReturnStatus,
    pub reason: String,
    pub refund_method: RefundMethod,
    pub refund_amount: i64,
    pub admin_note: Option<String>,
    pub processed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReturnItem {
    pub id: i64,
    pub return_id: i64,
    pub order_item_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnItemRequest {
    pub order_item_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateReturnRequest {
    pub order_id: i64,
    #[schema(example = "Sai kích cỡ")]
    pub reason: String,
    pub refund_method: Option<RefundMethod>,
    pub items: Vec<ReturnItemRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateReturnStatusRequest {
    pub status: ReturnStatus,
    pub admin_note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnResponse {
    pub id: i64,
    pub order_id: i64,
    pub status: ReturnStatus,
    pub reason: String,
    pub refund_method: RefundMethod,
    pub refund_amount: i64,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<ReturnItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<ReturnStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_transitions() {
        assert!(ReturnStatus::Pending.can_transition_to(ReturnStatus::Approved));
        assert!(ReturnStatus::Pending.can_transition_to(ReturnStatus::Rejected));
        assert!(ReturnStatus::Pending.can_transition_to(ReturnStatus::Cancelled));
        assert!(ReturnStatus::Approved.can_transition_to(ReturnStatus::Completed));
        assert!(ReturnStatus::Approved.can_transition_to(ReturnStatus::Cancelled));
    }

    #[test]
    fn test_return_rejected_transitions() {
        assert!(!ReturnStatus::Pending.can_transition_to(ReturnStatus::Completed));
        assert!(!ReturnStatus::Rejected.can_transition_to(ReturnStatus::Approved));
        assert!(!ReturnStatus::Completed.can_transition_to(ReturnStatus::Cancelled));
        assert!(!ReturnStatus::Cancelled.can_transition_to(ReturnStatus::Pending));
    }

    #[test]
    fn test_return_rejection_message_names_both_statuses() {
        let msg = ReturnStatus::Pending.transition_error(ReturnStatus::Completed);
        assert!(msg.contains("pending"));
        assert!(msg.contains("completed"));
    }
}
