// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use axum::Json;
use axum::Router;
use axum::extract::FromRequestParts;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::db::Database;
use crate::due::select_due;
use crate::error::ErrorKind;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail_with;
use crate::review::ReviewRequest;
use crate::review::ReviewSummary;
use crate::review::apply_reviews;
use crate::types::card::Card;
use crate::types::ids::DeckId;
use crate::types::ids::UserId;
use crate::types::timestamp::Timestamp;

/// The header carrying the authenticated caller's id.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct ServerState {
    pub db: Database,
    pub due_limit: usize,
}

pub async fn start_server(config: Config) -> Fallible<()> {
    let db = Database::new(config.database_path()?)?;
    let state = ServerState {
        db,
        due_limit: config.due_limit,
    };
    let app = router(state);

    log::info!("Starting server on {}", config.bind);
    let listener = TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped.");
    Ok(())
}

pub fn router(state: ServerState) -> Router {
    let app = Router::new();
    let app = app.route("/study/due", get(due_handler));
    let app = app.route("/study/review", post(review_handler));
    let app = app.fallback(not_found_handler);
    app.with_state(state)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutting down."),
        Err(e) => {
            // Without a signal handler, run until killed.
            log::error!("Failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    }
}

/// The authenticated caller, taken from the `x-user-id` header.
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ErrorReport;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else {
            return fail_with(ErrorKind::Unauthenticated, "Unauthenticated");
        };
        let Ok(value) = value.to_str() else {
            return fail_with(ErrorKind::Validation, "invalid user id");
        };
        let user_id = UserId::parse(value)?;
        Ok(Caller(user_id))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DueParams {
    /// Comma-separated deck ids.
    deck_ids: Option<String>,
    limit: Option<usize>,
}

async fn due_handler(
    State(state): State<ServerState>,
    Caller(owner): Caller,
    params: Result<Query<DueParams>, QueryRejection>,
) -> Result<Json<Vec<Card>>, ErrorReport> {
    let Query(params) =
        params.map_err(|e| ErrorReport::with_kind(ErrorKind::Validation, &e.body_text()))?;
    let deck_ids = parse_deck_ids(params.deck_ids.as_deref())?;
    let limit = params.limit.unwrap_or(state.due_limit);
    let cards = select_due(
        &state.db,
        owner,
        deck_ids.as_deref(),
        limit,
        Timestamp::now(),
    )?;
    Ok(Json(cards))
}

/// An absent or blank `deckIds` means no filter.
fn parse_deck_ids(value: Option<&str>) -> Fallible<Option<Vec<DeckId>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            let ids = value
                .split(',')
                .map(DeckId::parse)
                .collect::<Fallible<Vec<DeckId>>>()?;
            Ok(Some(ids))
        }
    }
}

#[derive(Deserialize)]
struct ReviewBody {
    #[serde(default)]
    reviews: Vec<ReviewRequest>,
}

async fn review_handler(
    State(state): State<ServerState>,
    Caller(owner): Caller,
    body: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<ReviewSummary>, ErrorReport> {
    let Json(body) =
        body.map_err(|e| ErrorReport::with_kind(ErrorKind::Validation, &e.body_text()))?;
    let now = Timestamp::now();
    let summary = state
        .db
        .review_transaction(|uow| apply_reviews(uow, owner, &body.reviews, now))?;
    Ok(Json(summary))
}

async fn not_found_handler() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" })))
}

impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::ReferentialIntegrity | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            log::error!("{}", self.message());
        } else {
            log::debug!("Rejected request ({status}): {}", self.message());
        }
        (status, Json(json!({ "message": self.message() }))).into_response()
    }
}
