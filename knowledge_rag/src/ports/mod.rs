pub mod index_state_repository;
pub mod text_generator;
pub mod vector_index;
