use crate::middlewares::AuthUser;
use crate::models::*;
use crate::services::LoyaltyService;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn get_auth_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

#[utoipa::path(
    get,
    path = "/loyalty/points",
    tag = "loyalty",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取积分余额成功", body = PointsResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn get_points(
    loyalty_service: web::Data<LoyaltyService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    match loyalty_service.get_points(user_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/loyalty/transactions",
    tag = "loyalty",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "获取积分流水成功"),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_transactions(
    loyalty_service: web::Data<LoyaltyService>,
    req: HttpRequest,
    query: web::Query<PointTransactionQuery>,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    match loyalty_service.list_transactions(user_id, &query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/loyalty/redeem",
    tag = "loyalty",
    request_body = RedeemPointsRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "兑换成功", body = RedeemPointsResponse),
        (status = 401, description = "未授权"),
        (status = 400, description = "积分不足或参数错误")
    )
)]
pub async fn redeem_points(
    loyalty_service: web::Data<LoyaltyService>,
    req: HttpRequest,
    request: web::Json<RedeemPointsRequest>,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    match loyalty_service
        .redeem_points(user_id, request.into_inner())
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
    post,
    path = "/loyalty/review-bonus",
    tag = "loyalty",
    request_body = ReviewBonusRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "评价奖励已发放", body = PointTransaction),
        (status = 401, description = "未授权"),
        (status = 400, description = "订单未签收或已发放")
    )
)]
pub async fn award_review_bonus(
    loyalty_service: web::Data<LoyaltyService>,
    req: HttpRequest,
    request: web::Json<ReviewBonusRequest>,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    match loyalty_service
        .award_review_bonus(user_id, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn loyalty_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/loyalty")
            .route("/points", web::get().to(get_points))
            .route("/transactions", web::get().to(list_transactions))
            .route("/redeem", web::post().to(redeem_points))
            .route("/review-bonus", web::post().to(award_review_bonus)),
    );
}
