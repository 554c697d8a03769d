use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use application::{ConversationOverview, MessageInput};
use domain::{
    Conversation, ConversationId, Message, NotificationEvent, NotificationId, NotificationType,
    PresenceState, SwipeDecision, SwipeOutcome, UserId,
};

use crate::{auth::AuthUser, error::ApiError, state::AppState, ws};

const DEFAULT_CONVERSATION_PAGE: u32 = 50;
const MAX_CONVERSATION_PAGE: u32 = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/swipes", post(swipe))
        .route("/matches", get(list_matches))
        .route(
            "/conversations",
            post(open_conversation).get(list_conversations),
        )
        .route(
            "/conversations/{id}/messages",
            post(send_message).get(message_history),
        )
        .route("/conversations/{id}/read", post(mark_conversation_read))
        .route("/unread", get(unread_count))
        .route("/notifications", get(notification_feed))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/notifications/{id}/read", post(mark_notification_read))
        .route("/follows/{user_id}", put(follow).delete(unfollow))
        .route("/presence", put(set_presence))
        .route("/presence/{user_id}", get(get_presence))
        .route("/ws", get(ws::upgrade))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct SwipePayload {
    target_id: UserId,
    decision: SwipeDecision,
}

async fn swipe(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<SwipePayload>,
) -> Result<Json<SwipeOutcome>, ApiError> {
    let outcome = state
        .services
        .matches
        .swipe(user, payload.target_id, payload.decision)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
struct MatchList {
    matches: Vec<UserId>,
}

async fn list_matches(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MatchList>, ApiError> {
    let matches = state.services.matches.matches(user).await?;
    Ok(Json(MatchList { matches }))
}

#[derive(Debug, Deserialize)]
struct OpenConversationPayload {
    peer_id: UserId,
}

async fn open_conversation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<OpenConversationPayload>,
) -> Result<Json<Conversation>, ApiError> {
    let conversation = state
        .services
        .chat
        .open_conversation(user, payload.peer_id)
        .await?;
    Ok(Json(conversation))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<u32>,
}

async fn list_conversations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ConversationOverview>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONVERSATION_PAGE)
        .clamp(1, MAX_CONVERSATION_PAGE);
    let overviews = state.services.chat.list_conversations(user, limit).await?;
    Ok(Json(overviews))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<ConversationId>,
    Json(input): Json<MessageInput>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = state
        .services
        .chat
        .send_message(conversation_id, user, input)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    before_seq: Option<i64>,
    limit: Option<u32>,
}

async fn message_history(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<ConversationId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .services
        .chat
        .history(conversation_id, user, query.before_seq, query.limit)
        .await?;
    Ok(Json(messages))
}

#[derive(Debug, Serialize)]
struct Flipped {
    flipped: u64,
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<ConversationId>,
) -> Result<Json<Flipped>, ApiError> {
    let flipped = state.services.chat.mark_read(conversation_id, user).await?;
    Ok(Json(Flipped { flipped }))
}

#[derive(Debug, Deserialize)]
struct UnreadQuery {
    conversation_id: Option<ConversationId>,
}

#[derive(Debug, Serialize)]
struct UnreadCount {
    unread: u64,
}

async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<UnreadQuery>,
) -> Result<Json<UnreadCount>, ApiError> {
    let unread = state
        .services
        .chat
        .unread_count(user, query.conversation_id)
        .await?;
    Ok(Json(UnreadCount { unread }))
}

#[derive(Debug, Serialize)]
struct NotificationFeed {
    unread: u64,
    items: Vec<NotificationEvent>,
}

async fn notification_feed(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<NotificationFeed>, ApiError> {
    let dispatcher = &state.services.dispatcher;
    let items = dispatcher.feed(user, query.limit).await?;
    let unread = dispatcher.unread_count(user).await?;
    Ok(Json(NotificationFeed { unread, items }))
}

#[derive(Debug, Serialize)]
struct NotificationRead {
    updated: bool,
}

async fn mark_notification_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<NotificationId>,
) -> Result<Json<NotificationRead>, ApiError> {
    let updated = state.services.dispatcher.mark_read(user, id).await?;
    Ok(Json(NotificationRead { updated }))
}

#[derive(Debug, Serialize)]
struct MarkedAll {
    count: u64,
}

async fn mark_all_notifications_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MarkedAll>, ApiError> {
    let count = state.services.dispatcher.mark_all_read(user).await?;
    Ok(Json(MarkedAll { count }))
}

async fn follow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(target): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    let request = application::NotifyRequest::new(NotificationType::Follow, user, target)
        .with_message("started following you");
    state.services.dispatcher.notify(request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unfollow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(target): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    state
        .services
        .dispatcher
        .retract(NotificationType::Follow, user, target, None)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PresencePayload {
    online: bool,
}

async fn set_presence(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<PresencePayload>,
) -> Result<Json<PresenceState>, ApiError> {
    let presence = state
        .services
        .presence
        .set_presence(user, payload.online)
        .await?;
    Ok(Json(presence))
}

async fn get_presence(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(user_id): Path<UserId>,
) -> Result<Json<PresenceState>, ApiError> {
    let presence = state.services.presence.presence(user_id).await?;
    Ok(Json(presence))
}
