pub mod invite_service_errors;
pub mod lobby_service_errors;
pub mod matchmaking_service_errors;
