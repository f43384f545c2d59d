pub mod invite_repository_errors;
pub mod match_repository_errors;
