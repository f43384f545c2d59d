pub mod errors;
pub mod invite_repository;
pub mod match_repository;
