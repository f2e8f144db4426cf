//! services/site/src/web/legacy.rs
//!
//! The retired asset prefix. Old links keep getting crawled, so they get a
//! cacheable `410 Gone` instead of a 404 that search engines would retry.

use axum::{
    extract::Path,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE},
        StatusCode,
    },
    response::IntoResponse,
};
use tracing::debug;

pub const GONE_CACHE_CONTROL: &str = "public, max-age=2592000, immutable";

/// Assets under the old prefix have been removed for good.
#[utoipa::path(
    get,
    path = "/api/mg-assets/{path}",
    params(
        ("path" = String, Path, description = "Any path below the retired prefix.")
    ),
    responses(
        (status = 410, description = "The asset is permanently gone", body = String, content_type = "text/plain")
    )
)]
pub async fn legacy_asset_handler(Path(path): Path<String>) -> impl IntoResponse {
    debug!("Legacy asset requested: {}", path);
    (
        StatusCode::GONE,
        [
            (CACHE_CONTROL, GONE_CACHE_CONTROL),
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
        ],
        "Gone",
    )
}
