use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

mod auth;
mod cart;
mod config;
mod db;
mod error;
mod favorites;
mod invoice;
mod models;
mod notify;
mod orders;
mod products;
mod reviews;
mod schema;
mod users;

use error::ApiError;
use notify::{LogMailer, Mailer};

#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub mailer: Arc<dyn Mailer>,
}

async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = auth::authenticate_request(request.headers(), &state.config.jwt_secret)?;
    log::debug!("Authenticated user: {} ({})", user.id, user.role.as_str());
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = config::AppConfig::load()?;
    log::info!("Loaded config for {}", config.app_url);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    let mut conn = db::establish_connection()?;
    db::ping(&mut conn)?;

    log::info!("Starting server on {}", addr);

    let state = AppState {
        config,
        mailer: Arc::new(LogMailer),
    };

    let protected_routes = Router::new()
        .route("/api/cart", get(cart::get_cart).post(cart::mutate_cart))
        .route(
            "/api/favorites",
            get(favorites::get_favorites).post(favorites::mutate_favorites),
        )
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route(
            "/api/orders/:id",
            get(orders::get_order).put(orders::update_order_status),
        )
        .route("/api/reviews", post(reviews::create_review))
        .route(
            "/api/reviews/:id",
            axum::routing::put(reviews::update_review).delete(reviews::delete_review),
        )
        .route(
            "/api/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/api/invoice/:id", get(invoice::get_invoice))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let app = Router::new()
        .route("/", get(|| async { "Hello, Harvest Market!" }))
        .route("/api/auth/register", post(users::register))
        .route("/api/auth/login", post(users::login))
        .route(
            "/api/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/api/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/api/products/:id/reviews",
            get(reviews::list_product_reviews),
        )
        .merge(protected_routes)
        .layer(cors)
        .with_state(state);

    axum::serve(TcpListener::bind(addr).await?, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        log::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        log::info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
