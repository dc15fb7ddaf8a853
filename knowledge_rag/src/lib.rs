pub mod commands;
pub mod configuration;
pub mod domain;
pub mod ports;
pub mod repositories;
pub mod startup;
