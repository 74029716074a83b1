use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.as_mut().unwrap();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        )
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::user::get_profile,
        handlers::user::update_profile,
        handlers::product::list_products,
        handlers::product::get_product,
        handlers::voucher::list_available_vouchers,
        handlers::voucher::validate_voucher,
        handlers::loyalty::get_points,
        handlers::loyalty::list_transactions,
        handlers::loyalty::redeem_points,
        handlers::loyalty::award_review_bonus,
        handlers::order::create_order,
        handlers::order::list_orders,
        handlers::order::get_order,
        handlers::order::cancel_order,
        handlers::return_request::create_return,
        handlers::return_request::list_returns,
        handlers::admin::dashboard,
        handlers::admin::list_vouchers,
        handlers::admin::create_voucher,
        handlers::admin::update_voucher,
        handlers::admin::delete_voucher,
        handlers::admin::voucher_usage_report,
        handlers::admin::record_voucher_usage,
        handlers::admin::list_all_products,
        handlers::admin::create_product,
        handlers::admin::update_product,
        handlers::admin::delete_product,
        handlers::admin::list_all_orders,
        handlers::admin::update_order_status,
        handlers::admin::bulk_update_order_status,
        handlers::admin::list_all_returns,
        handlers::admin::update_return_status,
        handlers::admin::set_account_status,
        handlers::admin::list_outbox,
        handlers::admin::retry_outbox_entry,
    ),
    components(
        schemas(
            User,
            UserRole,
            AccountStatus,
            CustomerSegment,
            UserResponse,
            ProfileResponse,
            AuthResponse,
            RegisterRequest,
            LoginRequest,
            RefreshRequest,
            UpdateProfileRequest,
            SetAccountStatusRequest,
            Product,
            CreateProductRequest,
            UpdateProductRequest,
            Voucher,
            VoucherType,
            TargetAudience,
            VoucherStatus,
            VoucherUsage,
            VoucherResponse,
            CreateVoucherRequest,
            UpdateVoucherRequest,
            ValidateVoucherRequest,
            ValidateVoucherResponse,
            RecordUsageRequest,
            LoyaltyTier,
            PointTransactionType,
            PointTransaction,
            RewardType,
            PointsResponse,
            RedeemPointsRequest,
            ReviewBonusRequest,
            RedeemPointsResponse,
            RedeemedReward,
            Order,
            OrderItem,
            OrderStatus,
            PaymentStatus,
            OrderItemRequest,
            CreateOrderRequest,
            OrderResponse,
            OrderDetailResponse,
            UpdateOrderStatusRequest,
            BulkUpdateStatusRequest,
            BulkUpdateResult,
            BulkUpdateStatusResponse,
            ReturnStatus,
            RefundMethod,
            ReturnItem,
            ReturnItemRequest,
            CreateReturnRequest,
            UpdateReturnStatusRequest,
            ReturnResponse,
            OutboxStatus,
            EmailOutboxEntry,
            DashboardStats,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication API"),
        (name = "user", description = "User profile API"),
        (name = "product", description = "Product catalog API"),
        (name = "voucher", description = "Voucher API"),
        (name = "loyalty", description = "Loyalty points API"),
        (name = "order", description = "Order API"),
        (name = "return", description = "Return request API"),
        (name = "admin", description = "Back office API"),
    ),
    info(
        title = "Velora Backend API",
        version = "1.0.0",
        description = "Velora storefront REST API documentation",
        contact(
            name = "API Support",
            email = "dev@velora.vn"
        )
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
