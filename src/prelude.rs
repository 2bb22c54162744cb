pub use salvo::oapi::{ToSchema, endpoint};
pub use salvo::prelude::*;
pub use serde::{Deserialize, Serialize};

pub use crate::error::AppError;
pub use crate::utils::limiter::{RateLimit, RouterRateLimitExt as _};

pub type AppResult<T> = Result<T, AppError>;
pub type JsonResult<T> = Result<Json<T>, AppError>;

pub fn json_ok<T>(data: T) -> JsonResult<T> {
    Ok(Json(data))
}
