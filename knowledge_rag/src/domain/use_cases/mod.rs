pub mod index_knowledge_base;
pub mod retrieve_context;
