use crate::middlewares::AuthUser;
use crate::models::*;
use crate::services::ReturnService;
use actix_web::{HttpMessage, HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

fn get_auth_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

#[utoipa::path(
    post,
    path = "/returns",
    tag = "return",
    request_body = CreateReturnRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "退货申请已创建", body = ReturnResponse),
        (status = 401, description = "未授权"),
        (status = 400, description = "订单不可退货或参数错误")
    )
)]
pub async fn create_return(
    return_service: web::Data<ReturnService>,
    req: HttpRequest,
    request: web::Json<CreateReturnRequest>,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    match return_service
        .create_return(user_id, request.into_inner())
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
    path = "/returns",
    tag = "return",
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
        (status = 401, description = "未授权")
    )
)]
pub async fn list_returns(
    return_service: web::Data<ReturnService>,
    req: HttpRequest,
    query: web::Query<ReturnQuery>,
) -> Result<HttpResponse> {
    let user_id = get_auth_user(&req).map(|u| u.id).unwrap_or(0);

    match return_service.list_user_returns(user_id, &query).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn return_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/returns")
            .route("", web::post().to(create_return))
            .route("", web::get().to(list_returns)),
    );
}
