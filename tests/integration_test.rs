mod alert_bus;
mod cluster_db;
mod common;
