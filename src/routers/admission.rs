//! Minimal HTTP admission surface (spec.md §4.6, §6): create a room and
//! inspect its membership. No independent state; a thin wrapper over the Hub.

use std::sync::Arc;

use crate::prelude::*;
use crate::signaling::Hub;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    room_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    room_id: String,
    users: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    users: Vec<String>,
}

pub fn router(path: &str) -> Router {
    Router::with_path(path)
        .oapi_tag("rooms")
        .push(
            Router::with_path("createRoom")
                .ip_rate_limit(&RateLimit::per_minute(10))
                .post(create_room),
        )
        .push(
            Router::with_path("room/{room_id}")
                .get(get_room)
                .push(Router::with_path("users").get(get_room_users)),
        )
}

fn room_id(req: &mut Request) -> Result<String, AppError> {
    req.param::<String>("room_id")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("missing room_id".into()))
}

fn hub(depot: &Depot) -> Arc<Hub> {
    depot.obtain::<Arc<Hub>>().cloned().expect("hub in depot")
}

/// `POST /createRoom`. Generates a collision-free room name (spec.md §6).
#[endpoint]
async fn create_room(depot: &mut Depot) -> JsonResult<CreateRoomResponse> {
    let room = hub(depot)
        .create_room_named()
        .ok_or(AppError::RoomNameExhausted)?;
    json_ok(CreateRoomResponse {
        room_id: room.name.clone(),
    })
}

/// `GET /room/{roomId}`. 404 if no such room exists (spec.md §6).
#[endpoint]
async fn get_room(req: &mut Request, depot: &mut Depot) -> JsonResult<RoomResponse> {
    let room_id = room_id(req)?;
    let room = hub(depot).get(&room_id).ok_or(AppError::RoomNotFound)?;
    json_ok(RoomResponse {
        room_id,
        users: room.member_ids(),
    })
}

/// `GET /room/{roomId}/users`. Equivalent to `get_room`, users only.
#[endpoint]
async fn get_room_users(req: &mut Request, depot: &mut Depot) -> JsonResult<UsersResponse> {
    let room = hub(depot)
        .get(&room_id(req)?)
        .ok_or(AppError::RoomNotFound)?;
    json_ok(UsersResponse {
        users: room.member_ids(),
    })
}

#[cfg(test)]
mod tests {
    use salvo::test::{ResponseExt, TestClient};

    use super::*;

    fn service() -> Service {
        Service::new(router("")).hoop(salvo::affix_state::inject(Arc::new(Hub::new())))
    }

    #[tokio::test]
    async fn create_room_then_fetch_its_empty_membership() {
        let service = service();
        let created: CreateRoomResponse = TestClient::post("http://127.0.0.1/createRoom")
            .send(&service)
            .await
            .take_json()
            .await
            .unwrap();

        let fetched: RoomResponse =
            TestClient::get(format!("http://127.0.0.1/room/{}", created.room_id))
                .send(&service)
                .await
                .take_json()
                .await
                .unwrap();
        assert_eq!(fetched.room_id, created.room_id);
        assert!(fetched.users.is_empty());
    }

    #[tokio::test]
    async fn unknown_room_is_404() {
        let service = service();
        let status = TestClient::get("http://127.0.0.1/room/ghost")
            .send(&service)
            .await
            .status_code;
        assert_eq!(status, Some(StatusCode::NOT_FOUND));
    }
}
