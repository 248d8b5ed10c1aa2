//! Chat sessions, scoped to the signed-in user

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use crate::store::ChatSession;

const INVALID_CHAT_ID: &str = "Invalid chat ID format";
const UNTITLED: &str = "Untitled Chat";

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/chat/history", get(list_chats).post(save_chat))
        .route("/chat/history/delete", post(delete_chats))
        .route("/chat/history/{id}", get(get_chat))
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveChatRequest {
    pub chat_id: Option<String>,
    pub messages: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteChatsRequest {
    pub ids: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    pub timestamp: String,
}

fn parse_chat_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(INVALID_CHAT_ID))
}

/// The first message's text, when it has one
fn chat_title(messages: &[Value]) -> String {
    messages
        .first()
        .and_then(|m| m.get("text"))
        .and_then(Value::as_str)
        .unwrap_or(UNTITLED)
        .to_string()
}

/// Create a chat, or replace the messages of one the caller owns
#[tracing::instrument(name = "POST /chat/history", skip_all)]
pub async fn save_chat(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    body: Result<Json<SaveChatRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let messages = req
        .messages
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing or empty messages data"))?;
    let title = chat_title(&messages);

    match req.chat_id.filter(|id| !id.is_empty()) {
        Some(raw) => {
            let id = parse_chat_id(&raw)?;
            let updated = state
                .store
                .update_chat(&user.email, id, title, messages)
                .await?;
            if !updated {
                return Err(ApiError::not_found("Chat not found or access denied"));
            }
            Ok((
                StatusCode::OK,
                Json(json!({"message": "Chat history updated successfully"})),
            ))
        }
        None => {
            let chat = ChatSession {
                id: Uuid::new_v4(),
                user_email: user.email,
                title,
                messages,
                timestamp: Utc::now(),
            };
            let id = chat.id;
            state.store.insert_chat(chat).await?;
            Ok((
                StatusCode::CREATED,
                Json(json!({"message": "Chat history saved successfully", "chat_id": id})),
            ))
        }
    }
}

#[tracing::instrument(name = "GET /chat/history", skip_all)]
pub async fn list_chats(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let chats = state.store.list_chats(&user.email).await?;
    Ok(Json(
        chats
            .into_iter()
            .map(|c| ChatSummary {
                id: c.id,
                title: c.title,
                timestamp: c.timestamp.to_rfc3339(),
            })
            .collect(),
    ))
}

#[tracing::instrument(name = "GET /chat/history/{id}", skip_all)]
pub async fn get_chat(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Path(raw): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    let id = parse_chat_id(&raw)?;
    state
        .store
        .find_chat(&user.email, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Chat session not found or access denied"))
}

#[tracing::instrument(name = "POST /chat/history/delete", skip_all)]
pub async fn delete_chats(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    body: Result<Json<DeleteChatsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let raw = body
        .ok()
        .and_then(|Json(req)| req.ids)
        .ok_or_else(|| ApiError::bad_request("Missing chat IDs"))?;
    let Value::Array(raw) = raw else {
        return Err(ApiError::bad_request("IDs should be a list"));
    };

    let ids = raw
        .iter()
        .map(|v| v.as_str().ok_or_else(|| ApiError::bad_request(INVALID_CHAT_ID)))
        .map(|s| s.and_then(parse_chat_id))
        .collect::<Result<Vec<_>, _>>()?;

    let deleted = state.store.delete_chats(&user.email, &ids).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("No conversations found to delete"));
    }
    Ok(Json(json!({
        "message": format!("{} conversations deleted successfully", deleted)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_title() {
        assert_eq!(chat_title(&[json!({"text": "Hello"})]), "Hello");
        assert_eq!(chat_title(&[json!({"sender": "bot"})]), UNTITLED);
        assert_eq!(chat_title(&[json!({"text": 3})]), UNTITLED);
    }

    #[test]
    fn test_parse_chat_id() {
        assert!(parse_chat_id("not-an-id").is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_chat_id(&id.to_string()).unwrap(), id);
    }
}
