pub mod embedding_point;
pub mod knowledge_base;
pub mod retrieved_context;
pub mod timeouts;
