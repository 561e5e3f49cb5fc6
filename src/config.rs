use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base REST URL used for gateway endpoint discovery.
    pub api_url: String,
    pub token: String,
    /// Gateway intents bitmask sent in IDENTIFY.
    pub intents: u64,
    /// Deadline for the discovery call and the initial socket connect.
    pub connect_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let api_url = std::env::var("DISCORD_API_URL")
            .unwrap_or_else(|_| "https://discord.com/api/v10".to_string());

        let token = std::env::var("DISCORD_TOKEN").expect("DISCORD_TOKEN is required");

        let intents: u64 = std::env::var("DISCORD_INTENTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let connect_timeout = std::env::var("MINICORD_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Self {
            api_url,
            token,
            intents,
            connect_timeout,
        }
    }
}
