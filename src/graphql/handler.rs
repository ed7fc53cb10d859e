//! `/graphql` routes

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::ACCEPT};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::ClientContext;
use crate::app::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/graphql", get(graphiql).post(graphql_handler))
}

async fn graphiql(headers: HeaderMap) -> impl IntoResponse {
    let accepts_html = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"));

    if accepts_html {
        Html(GraphiQLSource::build().endpoint("/graphql").finish()).into_response()
    } else {
        let message = "GET requests are not supported for GraphQL queries. \
                       Use POST with Content-Type: application/json";
        (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

async fn graphql_handler(
    State(state): State<AppState>,
    client: ClientContext,
    req: GraphQLRequest,
) -> GraphQLResponse {
    tracing::debug!(subject = %client.subject, "GraphQL request");
    state.schema.execute(req.into_inner().data(client)).await.into()
}
