//! Service banner.

use axum::response::IntoResponse;

/// Plain-text banner for humans and load balancers poking at `/`.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
