use crate::error::AppError;
use crate::middlewares::AuthUser;
use crate::models::*;
use crate::services::{
    AdminService, OrderService, OutboxService, ProductService, ReturnService, UserService,
    VoucherService,
};
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

/// 后台接口统一要求 admin 角色
fn require_admin(req: &HttpRequest) -> Result<AuthUser, AppError> {
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .filter(AuthUser::is_admin)
        .ok_or(AppError::PermissionDenied)
}

#[utoipa::path(
    get,
    path = "/admin/dashboard",
    tag = "admin",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取后台统计成功", body = DashboardStats),
        (status = 403, description = "权限不足")
    )
)]
pub async fn dashboard(
    admin_service: web::Data<AdminService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match admin_service.dashboard_stats().await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

// ---- 优惠券管理 ----

#[utoipa::path(
    get,
    path = "/admin/vouchers",
    tag = "admin",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "状态: upcoming/active/paused/expired")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取优惠券列表成功"),
        (status = 403, description = "权限不足")
    )
)]
pub async fn list_vouchers(
    voucher_service: web::Data<VoucherService>,
    req: HttpRequest,
    query: web::Query<VoucherQuery>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match voucher_service.list_vouchers(&query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/vouchers",
    tag = "admin",
    request_body = CreateVoucherRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "创建优惠券成功", body = VoucherResponse),
        (status = 403, description = "权限不足"),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn create_voucher(
    voucher_service: web::Data<VoucherService>,
    req: HttpRequest,
    request: web::Json<CreateVoucherRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match voucher_service.create_voucher(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/vouchers/{id}",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "优惠券ID")
    ),
    request_body = UpdateVoucherRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新优惠券成功", body = VoucherResponse),
        (status = 403, description = "权限不足"),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn update_voucher(
    voucher_service: web::Data<VoucherService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateVoucherRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match voucher_service
        .update_voucher(path.into_inner(), request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/vouchers/{id}",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "优惠券ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "删除优惠券成功"),
        (status = 403, description = "权限不足"),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn delete_voucher(
    voucher_service: web::Data<VoucherService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match voucher_service.delete_voucher(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Voucher deleted"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/vouchers/{id}/usages",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "优惠券ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取使用记录成功"),
        (status = 403, description = "权限不足"),
        (status = 404, description = "优惠券不存在")
    )
)]
pub async fn voucher_usage_report(
    voucher_service: web::Data<VoucherService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match voucher_service.usage_report(path.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/vouchers/record-usage",
    tag = "admin",
    request_body = RecordUsageRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "核销成功"),
        (status = 403, description = "权限不足"),
        (status = 400, description = "使用次数已满")
    )
)]
pub async fn record_voucher_usage(
    voucher_service: web::Data<VoucherService>,
    req: HttpRequest,
    request: web::Json<RecordUsageRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match voucher_service.record_usage(&request).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Usage recorded"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

// ---- 商品管理 ----

#[utoipa::path(
    get,
    path = "/admin/products",
    tag = "admin",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("category" = Option<String>, Query, description = "商品分类")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取商品列表成功(含下架)"),
        (status = 403, description = "权限不足")
    )
)]
pub async fn list_all_products(
    product_service: web::Data<ProductService>,
    req: HttpRequest,
    query: web::Query<ProductQuery>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match product_service.list_products(&query, true).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/products",
    tag = "admin",
    request_body = CreateProductRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "创建商品成功", body = Product),
        (status = 403, description = "权限不足"),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn create_product(
    product_service: web::Data<ProductService>,
    req: HttpRequest,
    request: web::Json<CreateProductRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match product_service.create_product(request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/products/{id}",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "商品ID")
    ),
    request_body = UpdateProductRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新商品成功", body = Product),
        (status = 403, description = "权限不足"),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn update_product(
    product_service: web::Data<ProductService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateProductRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match product_service
        .update_product(path.into_inner(), request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/admin/products/{id}",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "商品ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "下架商品成功"),
        (status = 403, description = "权限不足"),
        (status = 404, description = "商品不存在")
    )
)]
pub async fn delete_product(
    product_service: web::Data<ProductService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match product_service.delete_product(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Product deactivated"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

// ---- 订单管理 ----

#[utoipa::path(
    get,
    path = "/admin/orders",
    tag = "admin",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "订单状态")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取订单列表成功"),
        (status = 403, description = "权限不足")
    )
)]
pub async fn list_all_orders(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    query: web::Query<OrderQuery>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match order_service.list_all_orders(&query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/orders/status",
    tag = "admin",
    request_body = UpdateOrderStatusRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新订单状态成功", body = OrderResponse),
        (status = 403, description = "权限不足"),
        (status = 400, description = "非法状态迁移")
    )
)]
pub async fn update_order_status(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    request: web::Json<UpdateOrderStatusRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match order_service.update_status(&request).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/orders/bulk-status",
    tag = "admin",
    request_body = BulkUpdateStatusRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "批量更新完成(逐单聚合结果)", body = BulkUpdateStatusResponse),
        (status = 403, description = "权限不足"),
        (status = 400, description = "批量数量超限")
    )
)]
pub async fn bulk_update_order_status(
    order_service: web::Data<OrderService>,
    req: HttpRequest,
    request: web::Json<BulkUpdateStatusRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match order_service.bulk_update_status(&request).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

// ---- 退货管理 ----

#[utoipa::path(
    get,
    path = "/admin/returns",
    tag = "admin",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "退货状态")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取退货列表成功"),
        (status = 403, description = "权限不足")
    )
)]
pub async fn list_all_returns(
    return_service: web::Data<ReturnService>,
    req: HttpRequest,
    query: web::Query<ReturnQuery>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match return_service.list_all_returns(&query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/returns/{id}/status",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "退货单ID")
    ),
    request_body = UpdateReturnStatusRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新退货状态成功", body = ReturnResponse),
        (status = 403, description = "权限不足"),
        (status = 400, description = "非法状态迁移")
    )
)]
pub async fn update_return_status(
    return_service: web::Data<ReturnService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateReturnStatusRequest>,
) -> Result<HttpResponse> {
    let admin = match require_admin(&req) {
        Ok(admin) => admin,
        Err(e) => return Ok(e.error_response()),
    };

    match return_service
        .update_status(path.into_inner(), admin.id, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

// ---- 用户与发件箱管理 ----

#[utoipa::path(
    put,
    path = "/admin/users/{id}/status",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "用户ID")
    ),
    request_body = SetAccountStatusRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新账户状态成功", body = UserResponse),
        (status = 403, description = "权限不足"),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn set_account_status(
    user_service: web::Data<UserService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<SetAccountStatusRequest>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match user_service
        .set_account_status(path.into_inner(), request.into_inner().account_status)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/outbox",
    tag = "admin",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("status" = Option<String>, Query, description = "状态: pending/sent/failed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取发件箱成功"),
        (status = 403, description = "权限不足")
    )
)]
pub async fn list_outbox(
    outbox_service: web::Data<OutboxService>,
    req: HttpRequest,
    query: web::Query<OutboxQuery>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match outbox_service.list_entries(&query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/outbox/{id}/retry",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "发件箱条目ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已重新入队"),
        (status = 403, description = "权限不足"),
        (status = 404, description = "条目不存在或非失败状态")
    )
)]
pub async fn retry_outbox_entry(
    outbox_service: web::Data<OutboxService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    if let Err(e) = require_admin(&req) {
        return Ok(e.error_response());
    }

    match outbox_service.retry_failed(path.into_inner()).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Entry requeued"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/dashboard", web::get().to(dashboard))
            .route("/vouchers", web::get().to(list_vouchers))
            .route("/vouchers", web::post().to(create_voucher))
            .route("/vouchers/record-usage", web::post().to(record_voucher_usage))
            .route("/vouchers/{id}", web::put().to(update_voucher))
            .route("/vouchers/{id}", web::delete().to(delete_voucher))
            .route("/vouchers/{id}/usages", web::get().to(voucher_usage_report))
            .route("/products", web::get().to(list_all_products))
            .route("/products", web::post().to(create_product))
            .route("/products/{id}", web::put().to(update_product))
            .route("/products/{id}", web::delete().to(delete_product))
            .route("/orders", web::get().to(list_all_orders))
            .route("/orders/status", web::put().to(update_order_status))
            .route("/orders/bulk-status", web::post().to(bulk_update_order_status))
            .route("/returns", web::get().to(list_all_returns))
            .route("/returns/{id}/status", web::put().to(update_return_status))
            .route("/users/{id}/status", web::put().to(set_account_status))
            .route("/outbox", web::get().to(list_outbox))
            .route("/outbox/{id}/retry", web::post().to(retry_outbox_entry)),
    );
}
