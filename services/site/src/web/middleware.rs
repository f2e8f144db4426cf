//! services/site/src/web/middleware.rs
//!
//! Visitor identification middleware.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use dealer_analytics_core::consent;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::web::cookies::RequestCookies;
use crate::web::state::AppState;

/// The visitor behind the current request.
#[derive(Debug, Clone, Copy)]
pub struct Visitor {
    pub client_id: Uuid,
}

/// Middleware that reads the visitor's cookies and makes sure they carry a client id.
///
/// Inserts a `Visitor` and the request's `RequestCookies` into the request
/// extensions, then copies every cookie handlers set onto the response.
pub async fn identify_visitor(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Parse the incoming cookies
    let cookies = Arc::new(RequestCookies::from_headers(
        req.headers(),
        state.config.cookie_secure,
    ));

    // 2. Read or mint the client id
    let client_id = consent::client_id(cookies.as_ref());

    // 3. Hand both to the handler
    req.extensions_mut().insert(Visitor { client_id });
    req.extensions_mut().insert(cookies.clone());

    let mut response = next.run(req).await;

    // 4. Attach whatever cookies were written along the way
    for cookie in cookies.take_set_cookies() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Dropping unencodable Set-Cookie header: {}", e),
        }
    }
    response
}
