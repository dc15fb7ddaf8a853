pub mod embedding_point_in_memory_repository;
pub mod embedding_point_qdrant_repository;
pub mod index_state_in_memory_repository;
pub mod index_state_postgres_repository;
pub mod ollama_text_generator;
