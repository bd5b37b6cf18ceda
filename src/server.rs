// src/server.rs

use crate::config::Config;
use crate::directory::UserDirectory;
use crate::error::OidcRpError;
use crate::flow::RelyingParty;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Query parameters of the provider's callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

/// Builds the router serving the login endpoints.
pub fn router(relying_party: Arc<RelyingParty>) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/login/callback", get(callback))
        .route("/logout", get(logout))
        .route("/userinfo", get(userinfo))
        .with_state(relying_party)
}

/// Binds `config.listen_address` and serves until the process is interrupted.
pub async fn serve(config: Config, directory: Arc<dyn UserDirectory>) -> Result<(), OidcRpError> {
    let listen_address = config.listen_address.clone();
    let app = router(Arc::new(RelyingParty::new(config, directory)?));

    let listener = tokio::net::TcpListener::bind(&listen_address).await?;
    info!("Relying party listening on {}", listen_address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}

/// GET /login
async fn login(
    State(rp): State<Arc<RelyingParty>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, OidcRpError> {
    let redirect = rp.begin_login().await?;
    let jar = rp.sessions().encode_flow(&redirect.flow, jar);
    Ok((StatusCode::FOUND, jar, [(LOCATION, redirect.url.to_string())]))
}

/// GET /login/callback?code=..&state=..
async fn callback(
    State(rp): State<Arc<RelyingParty>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, OidcRpError> {
    let flow = rp.sessions().decode_flow(&jar)?;
    let outcome = rp.complete_login(&query.code, &query.state, &flow).await?;

    let jar = rp.sessions().clear_flow(jar);
    let jar = rp.sessions().encode(&outcome.tokens, jar);
    Ok((jar, Json(outcome.claims)))
}

/// GET /logout
async fn logout(State(rp): State<Arc<RelyingParty>>, jar: CookieJar) -> impl IntoResponse {
    (rp.sessions().clear(jar), "logout")
}

/// GET /userinfo
async fn userinfo(
    State(rp): State<Arc<RelyingParty>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, OidcRpError> {
    let tokens = rp.sessions().decode(&jar)?;
    let user = rp.session_user(&tokens).await?;
    Ok(Json(user))
}
