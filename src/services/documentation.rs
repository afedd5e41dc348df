use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Fibbing It backend.
///
/// WebSocket frames cannot be described as HTTP operations; their payloads are
/// listed as schemas so clients can generate types for them.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::health::readiness,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ws::CreateRoomRequest,
            crate::dto::ws::JoinLobbyRequest,
            crate::dto::ws::StartGameRequest,
            crate::dto::ws::KickPlayerRequest,
            crate::dto::ws::UpdateNicknameRequest,
            crate::dto::ws::SubmitAnswerRequest,
            crate::dto::ws::SubmitVoteRequest,
            crate::dto::ws::EmptyRequest,
            crate::dto::views::View,
        )
    ),
    tags(
        (name = "health", description = "Health and readiness probes"),
        (name = "players", description = "WebSocket session of a player"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_routes_and_frames() {
        let doc = ApiDoc::openapi();
        for path in ["/healthcheck", "/readiness", "/ws"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemas = doc.components.expect("components").schemas;
        assert!(schemas.contains_key("View"));
        assert!(schemas.contains_key("SubmitVoteRequest"));
    }
}
