pub mod config;
pub mod errors;
pub mod hover;
pub mod lsp;
pub mod revision;
pub mod scanner;
pub mod text;
pub mod types;
