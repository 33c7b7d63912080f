pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod graph;
pub mod kb;
pub mod llm;
pub mod models;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{MindOrbitError, Result};
pub use graph::{build_graph, RelationGraph};
pub use kb::KnowledgeBase;
pub use models::{ItemType, KnowledgeItem};
