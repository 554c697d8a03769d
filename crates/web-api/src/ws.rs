//! WebSocket 实时通道
//!
//! 一个连接对应一个在线会话：连接建立时置为在线，推送通知与未读数变化，
//! 客户端可以发送 `watch` 帧关注对方在线状态；连接关闭时释放全部订阅并置为离线。

use application::{PresenceSession, ServiceContainer};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use domain::{PresenceState, StoreEvent, UserId};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    auth::bearer_token,
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub(crate) struct WsQuery {
    token: Option<String>,
}

/// 服务端推送帧
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Unread { count: u64 },
    Notification { event: StoreEvent },
    Presence { presence: PresenceState },
    Error { message: String },
}

/// 客户端帧
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Watch { user_id: UserId },
}

/// 浏览器无法设置请求头，令牌也可以放在 `?token=` 中
pub(crate) async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    let claims = state.jwt.verify_token(token)?;
    let user = UserId::from(claims.user_id);

    Ok(ws.on_upgrade(move |socket| handle_socket(state.services, user, socket)))
}

async fn handle_socket(services: ServiceContainer, user: UserId, socket: WebSocket) {
    let mut session = match PresenceSession::start(services.presence.clone(), user).await {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(user_id = %user, error = %err, "无法建立在线会话");
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let notifications = {
        let tx = tx.clone();
        services.dispatcher.subscribe(user, move |event| {
            let _ = tx.send(ServerFrame::Notification { event });
        })
    };
    let unread = {
        let tx = tx.clone();
        services.read_state.subscribe(user, move |count| {
            let _ = tx.send(ServerFrame::Unread { count });
        })
    };

    match services.chat.unread_count(user, None).await {
        Ok(count) => {
            let _ = tx.send(ServerFrame::Unread { count });
        }
        Err(err) => tracing::warn!(user_id = %user, error = %err, "读取初始未读数失败"),
    }

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(error = %err, "推送帧序列化失败");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(incoming) = receiver.next().await {
        match incoming {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(ClientFrame::Watch { user_id }) => {
                    match services.presence.presence(user_id).await {
                        Ok(presence) => {
                            let _ = tx.send(ServerFrame::Presence { presence });
                        }
                        Err(err) => {
                            let _ = tx.send(ServerFrame::Error {
                                message: err.to_string(),
                            });
                        }
                    }
                    let tx = tx.clone();
                    session.watch(user_id, move |presence| {
                        let _ = tx.send(ServerFrame::Presence { presence });
                    });
                }
                Err(err) => {
                    let _ = tx.send(ServerFrame::Error {
                        message: format!("invalid frame: {err}"),
                    });
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(user_id = %user, error = %err, "WebSocket 读取失败");
                break;
            }
        }
    }

    notifications.unsubscribe();
    unread.unsubscribe();
    if let Err(err) = session.end().await {
        tracing::warn!(user_id = %user, error = %err, "结束在线会话失败");
    }
    send_task.abort();
    tracing::debug!(user_id = %user, "WebSocket 连接关闭");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_use_snake_case_tags() {
        let frame = serde_json::to_value(ServerFrame::Unread { count: 3 }).expect("serialize");
        assert_eq!(frame["type"], "unread");
        assert_eq!(frame["count"], 3);

        let watch: ClientFrame = serde_json::from_str(
            r#"{"type":"watch","user_id":"6f1c2a1e-8d0b-4a9c-9a58-3f0e6b7c1d22"}"#,
        )
        .expect("parse watch frame");
        assert!(matches!(watch, ClientFrame::Watch { .. }));
    }
}
