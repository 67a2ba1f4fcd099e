use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

use crate::workspace::ScheduleOptions;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub debug: bool,
    pub auth_token: String,
    pub enable_swagger: bool,
    pub port: u16,
    pub data_dir: String,
    pub class_id_prefix: String,
    pub class_id_width: usize,
    pub fee_display_scale: f64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // APP_AUTH_TOKEN -> auth_token
            .add_source(Environment::with_prefix("APP").try_parsing(true))
            .set_default("debug", false)?
            .set_default("auth_token", "default-token-change-me")?
            .set_default("enable_swagger", true)?
            .set_default("port", 8080)?
            .set_default("data_dir", "data")?
            .set_default("class_id_prefix", "MCT")?
            .set_default("class_id_width", 3)?
            .set_default("fee_display_scale", 1.0)?
            .build()?;

        config.try_deserialize()
    }

    pub fn schedule_options(&self) -> ScheduleOptions {
        ScheduleOptions {
            class_id_prefix: self.class_id_prefix.clone(),
            class_id_width: self.class_id_width,
            fee_display_scale: self.fee_display_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    const VARS: &[&str] = &[
        "APP_PORT",
        "APP_CLASS_ID_PREFIX",
        "APP_FEE_DISPLAY_SCALE",
        "APP_AUTH_TOKEN",
    ];

    fn clear_vars() {
        for var in VARS {
            // SAFETY: env-touching tests run serially.
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_vars();
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.class_id_prefix, "MCT");
        assert_eq!(settings.class_id_width, 3);
        assert_eq!(settings.fee_display_scale, 1.0);
        assert_eq!(settings.schedule_options(), ScheduleOptions::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_vars();
        // SAFETY: env-touching tests run serially.
        unsafe {
            std::env::set_var("APP_PORT", "9090");
            std::env::set_var("APP_CLASS_ID_PREFIX", "TUT");
            std::env::set_var("APP_FEE_DISPLAY_SCALE", "1000");
            std::env::set_var("APP_AUTH_TOKEN", "s3cret");
        }
        let settings = Settings::from_env().unwrap();
        clear_vars();

        assert_eq!(settings.port, 9090);
        assert_eq!(settings.class_id_prefix, "TUT");
        assert_eq!(settings.fee_display_scale, 1000.0);
        assert_eq!(settings.auth_token, "s3cret");
    }
}
