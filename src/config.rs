use std::env;

/// Which persistence backend to run against. Mirrors the BUS_TYPE switch
/// used elsewhere on the platform: Postgres in production, the in-process
/// store for local development and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub store_backend: StoreBackend,
    pub database_url: Option<String>,

    /// Base URL used to build the browser return URL and the webhook
    /// notify URL handed to the gateway.
    pub public_base_url: String,

    pub cron_secret: String,

    pub identity_jwt_secret: String,
    pub identity_project_id: String,

    pub email_api_key: String,
    pub email_template_id: String,
}

impl Config {
    /// Load configuration from the environment. Required values fail
    /// closed: a missing secret aborts startup rather than degrading into
    /// an insecure path.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => return Err(format!("Invalid STORE_BACKEND: {other}")),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err("Missing DATABASE_URL".to_string());
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| "PORT must be a valid u16".to_string())?,
            store_backend,
            database_url,
            public_base_url: required("PUBLIC_BASE_URL")?,
            cron_secret: required("CRON_SECRET")?,
            identity_jwt_secret: required("IDENTITY_JWT_SECRET")?,
            identity_project_id: required("IDENTITY_PROJECT_ID")?,
            email_api_key: required("EMAIL_API_KEY")?,
            email_template_id: required("EMAIL_TEMPLATE_ID")?,
        })
    }
}

fn required(name: &str) -> Result<String, String> {
    env::var(name).map_err(|_| format!("Missing {name}"))
}
