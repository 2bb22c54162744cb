use std::sync::Arc;
use std::time::Duration;

use salvo::cors::{AllowHeaders, AllowOrigin, Cors};
use salvo::http::Method;

use crate::prelude::*;
use crate::signaling::{Hub, ws};

pub mod admission;

const OPENAPI_JSON: &str = "/api-doc/openapi.json";

pub fn root(hub: Arc<Hub>) -> Router {
    let config = crate::config::get();

    let cors = match &config.allowed_origins {
        Some(origins) => Cors::new()
            .allow_origin(AllowOrigin::list(origins.clone()))
            .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(AllowHeaders::any())
            .into_handler(),
        None => Cors::permissive().into_handler(),
    };

    // spec.md §6 specifies createRoom/room/{roomId} as literal paths (only
    // `/ws` is flagged there as "or equivalent path"), so these are mounted
    // at the root rather than under the teacher's usual `/api` prefix.
    let admission_routes = admission::router("")
        .hoop(crate::utils::logger::Logger)
        .hoop(Timeout::new(Duration::from_secs(30)));
    let ws_routes = Router::with_path("ws")
        .hoop(crate::utils::logger::Logger)
        .get(ws::upgrade);

    let doc = openapi_doc(&admission_routes);

    Router::new()
        .hoop(cors)
        .hoop(salvo::affix_state::inject(hub))
        .hoop(salvo::affix_state::inject(Arc::new(config.clone())))
        .push(admission_routes)
        .push(ws_routes)
        .unshift(doc.into_router(OPENAPI_JSON))
        .unshift(Scalar::new(OPENAPI_JSON).into_router("scalar"))
        .unshift(SwaggerUi::new(OPENAPI_JSON).into_router("swagger-ui"))
        .unshift(RapiDoc::new(OPENAPI_JSON).into_router("rapidoc"))
        .unshift(ReDoc::new(OPENAPI_JSON).into_router("redoc"))
}

fn openapi_doc(to_document: &Router) -> OpenApi {
    OpenApi::new("Signaling Hub API", "0.1.0").merge_router(to_document)
}
