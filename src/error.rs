use salvo::http::{StatusCode, StatusError};
use salvo::oapi::{self, EndpointOutRegister, ToSchema};
use salvo::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("room not found")]
    RoomNotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("origin not allowed")]
    OriginNotAllowed,
    #[error("room name generation exhausted its retry budget")]
    RoomNameExhausted,
    #[error("websocket upgrade failed")]
    Upgrade(#[from] salvo::Error),
}

impl Scribe for AppError {
    fn render(self, res: &mut Response) {
        let status_error = match self {
            Self::RoomNotFound => StatusError::not_found().brief("Room not found"),
            Self::BadRequest(message) => StatusError::bad_request().brief(message),
            Self::OriginNotAllowed => {
                StatusError::forbidden().brief("Origin not allowed")
            }
            Self::RoomNameExhausted => {
                tracing::error!("exhausted room name generation attempts");
                StatusError::internal_server_error()
            }
            Self::Upgrade(err) => {
                tracing::error!(error = ?err, "websocket upgrade failed");
                StatusError::internal_server_error()
            }
        };
        res.render(status_error);
    }
}

impl EndpointOutRegister for AppError {
    fn register(components: &mut oapi::Components, operation: &mut oapi::Operation) {
        let responses = [
            (StatusCode::BAD_REQUEST, "Bad request"),
            (StatusCode::FORBIDDEN, "Origin not allowed"),
            (StatusCode::NOT_FOUND, "Room not found"),
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        ];

        for (status, description) in responses {
            operation.responses.insert(
                status.as_str(),
                oapi::Response::new(description)
                    .add_content("application/json", StatusError::to_schema(components)),
            );
        }
    }
}
