use crate::http::types::{
    CreateSmsRequest, HttpResponse, JsonResult, SetLogLevelRequest, StoreSmsRequest,
    WebSocketQuery,
};
use crate::http::websocket::{handle_websocket, WebSocketConnection};
use crate::http::HttpState;
use crate::sms::entity::OutgoingProperties;
use crate::sms::error::SmsError;
use crate::sms::storage::Storage;
use anyhow::anyhow;
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use sms_pdu::pdu::{PduAddress, TypeOfNumber};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

macro_rules! sms_error_response {
    ($e:expr) => {{
        let status = if $e.is_client_fault() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(HttpResponse {
                success: false,
                response: None,
                error: Some($e.to_string()),
            }),
        )
    }};
}

fn sms_not_found() -> (StatusCode, Json<HttpResponse<crate::events::SmsSnapshot>>) {
    (
        StatusCode::NOT_FOUND,
        Json(HttpResponse {
            success: false,
            response: None,
            error: Some("No SMS object exists at this path".to_string()),
        }),
    )
}

fn sms_path(id: &str) -> String {
    format!("/sms/{id}")
}

pub async fn create_sms(
    State(state): State<HttpState>,
    Json(payload): Json<CreateSmsRequest>,
) -> JsonResult<crate::events::SmsSnapshot> {
    if let Some(number) = &payload.number {
        if state.config.send_international_format_only {
            match PduAddress::from_str(number) {
                Ok(address) if !matches!(address.type_addr.type_of_number, TypeOfNumber::International) => {
                    return Err(sms_error_response!(SmsError::Transport(anyhow!(
                        "Sending phone number must be in international format!"
                    ))));
                }
                Err(e) => {
                    return Err(sms_error_response!(SmsError::Transport(anyhow!(
                        "Invalid phone number: {e}"
                    ))))
                }
                _ => {}
            }
        }
    }

    let data = match payload.data_hex {
        Some(hex_str) => Some(
            hex::decode(&hex_str)
                .map_err(|e| sms_error_response!(SmsError::Transport(anyhow!("Invalid data_hex: {e}"))))?,
        ),
        None => None,
    };

    let props = OutgoingProperties {
        number: payload.number,
        text: payload.text,
        data,
        flash: payload.flash,
        validity: payload.validity_period,
    };

    let sms = state.sms_service.create(props).map_err(|e| sms_error_response!(e))?;
    let snapshot = sms.snapshot().await;
    Ok(Json(HttpResponse { success: true, response: Some(snapshot), error: None }))
}

pub async fn list_sms(State(state): State<HttpState>) -> JsonResult<Vec<crate::events::SmsSnapshot>> {
    let mut snapshots = Vec::new();
    for sms in state.sms_service.list() {
        snapshots.push(sms.snapshot().await);
    }
    Ok(Json(HttpResponse { success: true, response: Some(snapshots), error: None }))
}

pub async fn get_sms(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> JsonResult<crate::events::SmsSnapshot> {
    let sms = state.sms_service.get(&sms_path(&id)).ok_or_else(sms_not_found)?;
    let snapshot = sms.snapshot().await;
    Ok(Json(HttpResponse { success: true, response: Some(snapshot), error: None }))
}

pub async fn store_sms(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    payload: Option<Json<StoreSmsRequest>>,
) -> JsonResult<crate::events::SmsSnapshot> {
    let sms = state.sms_service.get(&sms_path(&id)).ok_or_else(sms_not_found)?;

    let storage = payload
        .and_then(|p| p.0.storage.clone())
        .and_then(|s| Storage::from_at_str(&s))
        .unwrap_or(Storage::Unknown);

    state.sms_service.store(&sms, storage).await.map_err(|e| sms_error_response!(e))?;
    let snapshot = sms.snapshot().await;
    Ok(Json(HttpResponse { success: true, response: Some(snapshot), error: None }))
}

pub async fn send_sms(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> JsonResult<crate::events::SmsSnapshot> {
    let sms = state.sms_service.get(&sms_path(&id)).ok_or_else(sms_not_found)?;
    state.sms_service.send(&sms).await.map_err(|e| sms_error_response!(e))?;
    let snapshot = sms.snapshot().await;
    Ok(Json(HttpResponse { success: true, response: Some(snapshot), error: None }))
}

pub async fn delete_sms(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> JsonResult<bool> {
    let sms = state.sms_service.get(&sms_path(&id)).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(HttpResponse {
                success: false,
                response: None,
                error: Some("No SMS object exists at this path".to_string()),
            }),
        )
    })?;
    state.sms_service.delete(&sms).await.map_err(|e| sms_error_response!(e))?;
    Ok(Json(HttpResponse { success: true, response: Some(true), error: None }))
}

pub async fn sys_version(State(_state): State<HttpState>) -> &'static str {
    crate::VERSION
}

pub async fn sys_phone_number(State(state): State<HttpState>) -> Json<Option<String>> {
    Json(state.config.phone_number.clone())
}

pub async fn sys_set_log_level(
    State(state): State<HttpState>,
    Json(payload): Json<SetLogLevelRequest>,
) -> JsonResult<bool> {
    let result: anyhow::Result<bool> = (|| {
        let filter = EnvFilter::from_str(&payload.level)?;
        tracing::log::info!("Setting log level to {filter} via API");
        state.tracing_reload.reload(filter).map(|_| true).map_err(|e| anyhow!(e))
    })();

    match result {
        Ok(data) => Ok(Json(HttpResponse { success: true, response: Some(data), error: None })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HttpResponse { success: false, response: None, error: Some(e.to_string()) }),
        )),
    }
}

pub async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<HttpState>,
    Query(query_params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    // Read all target events from query string for filtering.
    let events = query_params.get_event_types();
    let response = match state.websocket {
        Some(manager) => ws.on_upgrade(|socket| {
            let connection: WebSocketConnection = (socket, events);
            handle_websocket(connection, manager)
        }),
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body("Websocket functionality is disabled!".into())
            .unwrap_or_else(|_| Response::new("Internal Server Error".into())),
    };
    Ok(response)
}
