mod package_bus_case;
mod sled_alert_case;
mod watch_case;
