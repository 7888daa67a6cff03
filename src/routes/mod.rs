pub mod eval;
pub mod github;
pub mod health;
