use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::battle::start_match,
        crate::routes::battle::submit_answer,
        crate::routes::battle::use_consumable,
        crate::routes::battle::finish_match,
        crate::routes::battle::match_state,
        crate::routes::events::match_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::battle::OwnerActionRequest,
            crate::dto::battle::SubmitAnswerRequest,
            crate::dto::battle::UseConsumableRequest,
            crate::dto::battle::StartMatchResponse,
            crate::dto::battle::SubmitAnswerResponse,
            crate::dto::battle::UseConsumableResponse,
            crate::dto::battle::MatchStateResponse,
            crate::dto::battle::SelfState,
            crate::dto::battle::CurrentQuestionState,
            crate::dto::battle::QuestionPublic,
            crate::dto::battle::LeaderboardEntry,
            crate::dto::battle::PlayerResult,
            crate::dto::battle::MatchResultResponse,
            crate::dto::events::MatchStartedEvent,
            crate::dto::events::QuestionRevealedEvent,
            crate::dto::events::AnswerRevealEvent,
            crate::dto::events::ScoreUpdateEvent,
            crate::dto::events::LeaderboardUpdateEvent,
            crate::dto::events::MatchFinishedEvent,
            crate::dto::events::ItemUsedEvent,
            crate::dao::models::MatchStatus,
            crate::dao::models::MatchKind,
            crate::dao::models::OptionKey,
            crate::dao::models::ContentKind,
            crate::dao::models::ConsumableKind,
            crate::dao::models::RankTier,
            crate::dao::models::MatchReward,
            crate::scoring::RuleMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "matches", description = "Match lifecycle and gameplay operations"),
        (name = "events", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
