use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod attachments;
pub mod auth;
pub mod conversations;
pub mod extract;
pub mod health;
pub mod messages;
pub mod participants;
pub mod reactions;

/// Success body shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

pub fn data<T: Serialize>(value: T) -> Json<Envelope<T>> {
    Json(Envelope { data: value })
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = build_cors(state.config.cors_allowed_origin.as_deref());

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let conversation_routes = Router::new()
        .route(
            "/",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/unread-count", get(conversations::total_unread))
        .route(
            "/:id",
            get(conversations::get_conversation).put(conversations::update_conversation),
        )
        .route("/:id/read", post(conversations::mark_read))
        .route("/:id/unread-count", get(conversations::unread_count))
        .route("/:id/mute", put(participants::set_muted))
        .route("/:id/participants", post(participants::add_participant))
        .route(
            "/:id/participants/:user_id",
            delete(participants::remove_participant),
        )
        .route(
            "/:id/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route("/:id/attachments", post(attachments::upload_attachment));

    let message_routes = Router::new()
        .route(
            "/:id",
            put(messages::edit_message).delete(messages::delete_message),
        )
        .route("/:id/attachment", get(attachments::attachment_url))
        .route(
            "/:id/reactions",
            get(reactions::list_reactions).post(reactions::add_reaction),
        )
        .route(
            "/:id/reactions/:reaction_id",
            delete(reactions::remove_reaction),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/conversations", conversation_routes)
        .nest("/api/messages", message_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    let body_limit = state.config.attachment_max_bytes;

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

fn build_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed_origins {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
