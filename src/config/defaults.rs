use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/openei.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            fallback_interval_secs: 30,
            setup_retry_secs: 60,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openei.org/utility_rates".to_string(),
            timeout_secs: 10,
            plan_cache_hours: 24,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            timezone: "UTC".to_string(),
            storage_dir: ".storage".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            coordinator: CoordinatorConfig::default(),
            api: ApiConfig::default(),
            host: HostConfig::default(),
            entries: Vec::new(),
        }
    }
}
