mod command_loop;
mod delete;
mod helpers;
mod retrieval;
