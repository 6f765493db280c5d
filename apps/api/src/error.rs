use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ds_core::ErrorBody;
use ds_error::{DsError, ErrorMetadataBuilder};
use once_cell::sync::OnceCell;

static EXPOSE_DETAILS: OnceCell<bool> = OnceCell::new();

/// 启动时调用一次；生产环境不返回 `details`
pub fn expose_details(enabled: bool) {
    EXPOSE_DETAILS.set(enabled).ok();
}

fn details_enabled() -> bool {
    *EXPOSE_DETAILS.get().unwrap_or(&true)
}

/// 所有路由共用的错误信封 `{error, details?}`
#[derive(Debug)]
pub struct ApiError(pub DsError);

impl From<DsError> for ApiError {
    fn from(err: DsError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// 5xx 响应体；4xx 直接使用 `DsError` 自身的响应
    pub fn server_body(&self, with_details: bool) -> ErrorBody {
        ErrorBody {
            error: self.0.user_message(),
            details: with_details.then(|| format!("{:?}", self.0)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0
            .log(&ErrorMetadataBuilder::new("api").build(&self.0));
        let status = self.status();
        if status.is_client_error() {
            return self.0.into_response();
        }
        (status, Json(self.server_body(details_enabled()))).into_response()
    }
}

/// `CatchPanicLayer` 的响应，与 `ApiError` 同形
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %message, "handler panicked");
    let body = ErrorBody {
        error: "Internal server error".to_string(),
        details: details_enabled().then_some(message),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
