use dotenv::dotenv;
use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Sender address for order receipts. Opaque pass-through configuration.
    pub mail_from: String,
    /// Public base URL, used in receipt links.
    pub app_url: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv().ok(); // Load .env file if present
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            port: env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse()?,
            jwt_secret: env::var("JWT_SECRET")?,
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "orders@harvest-market.local".to_string()),
            app_url: env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
        })
    }
}
