use crate::middlewares::AuthUser;
use crate::models::*;
use crate::services::{UserService, VoucherService};
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn get_auth_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

#[utoipa::path(
    get,
    path = "/vouchers",
    tag = "voucher",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取可用优惠券列表成功"),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_available_vouchers(
    voucher_service: web::Data<VoucherService>,
    user_service: web::Data<UserService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    let user = match user_service.get_user(user_id).await {
        Ok(user) => user,
        Err(e) => return Ok(e.error_response()),
    };

    match voucher_service.list_available(user_id, &user.email).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/vouchers/validate",
    tag = "voucher",
    request_body = ValidateVoucherRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "校验完成", body = ValidateVoucherResponse),
        (status = 401, description = "未授权"),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn validate_voucher(
    voucher_service: web::Data<VoucherService>,
    req: HttpRequest,
    request: web::Json<ValidateVoucherRequest>,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    match voucher_service.validate(user_id, &request).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn voucher_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/vouchers")
            .route("", web::get().to(list_available_vouchers))
            .route("/validate", web::post().to(validate_voucher)),
    );
}
