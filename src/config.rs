use dotenvy::dotenv;
use std::env;

#[derive(Clone)]
pub struct Config {
    pub server_addr: String,
    pub database_url: String,
    /// Base URL of the gateway fronting the user service.
    pub gateway_url: String,
    pub qr_token_secret: String,
    pub qr_token_ttl_secs: i64,
    /// Base URL embedded in generated QR links.
    pub qr_base_url: String,
    pub upstream_timeout_secs: u64,

    // Rate limiting
    pub rate_mark_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let gateway_url = env::var("GATEWAY_URL").expect("GATEWAY_URL must be set");

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            qr_token_secret: env::var("QR_TOKEN_SECRET").expect("QR_TOKEN_SECRET must be set"),
            qr_token_ttl_secs: env::var("QR_TOKEN_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string()) // default 1 hour
                .parse()
                .unwrap(),
            qr_base_url: env::var("QR_BASE_URL").unwrap_or_else(|_| gateway_url.clone()),
            upstream_timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap(),

            rate_mark_per_min: env::var("RATE_MARK_PER_MIN")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap(),
            rate_protected_per_min: env::var("RATE_PROTECTED_PER_MIN")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap(),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/v1/api".to_string()),
            gateway_url,
        }
    }
}
