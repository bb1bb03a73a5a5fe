pub mod connection;
pub mod migrations;
pub mod repositories;
