use serde::Deserialize;

/// Top-level engine configuration, loaded from `wordround.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reserved for the transport host that embeds the engine.
    pub listen_addr: String,
    pub game: GameConfig,
    pub persistence: PersistenceConfig,
    pub recovery: RecoveryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            game: GameConfig::default(),
            persistence: PersistenceConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Round progression policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Confirmation window before a round starts automatically.
    pub round_timer_secs: u64,
    pub min_players: usize,
    pub points_per_answer: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            round_timer_secs: 30,
            min_players: 2,
            points_per_answer: 10,
        }
    }
}

/// Snapshot and event-log behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub snapshot_interval_secs: u64,
    pub snapshot_keep_count: usize,
    /// How many recent events the admin info surface returns.
    pub recent_event_limit: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: 30,
            snapshot_keep_count: 5,
            recent_event_limit: 10,
        }
    }
}

/// Startup recovery and retention sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Rooms finished longer ago than this get their snapshot history
    /// trimmed during the startup sweep.
    pub finished_retention_hours: u64,
    pub finished_keep_count: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            finished_retention_hours: 24,
            finished_keep_count: 2,
        }
    }
}

impl EngineConfig {
    /// Validate configuration, exiting on values the engine cannot run with.
    pub fn validate(&self) {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            tracing::error!(addr = %self.listen_addr, "listen_addr is not a valid socket address");
            std::process::exit(1);
        }
        if self.game.round_timer_secs == 0 {
            tracing::error!("game.round_timer_secs must be > 0");
            std::process::exit(1);
        }
        if self.game.min_players < 2 {
            tracing::error!("game.min_players must be >= 2");
            std::process::exit(1);
        }
        if self.persistence.snapshot_interval_secs == 0 {
            tracing::error!("persistence.snapshot_interval_secs must be > 0");
            std::process::exit(1);
        }
        if self.persistence.snapshot_keep_count == 0 {
            tracing::error!("persistence.snapshot_keep_count must be > 0");
            std::process::exit(1);
        }
        if self.recovery.finished_keep_count == 0 {
            tracing::error!("recovery.finished_keep_count must be > 0");
            std::process::exit(1);
        }
    }

    /// Load config from `wordround.toml` if it exists, then apply env var
    /// overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("wordround.toml") {
            Ok(content) => match toml::from_str::<EngineConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from wordround.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse wordround.toml: {e}, using defaults");
                    EngineConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No wordround.toml found, using defaults");
                EngineConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("WORDROUND_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(val) = std::env::var("WORDROUND_ROUND_TIMER_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.game.round_timer_secs = n;
        }
        if let Ok(val) = std::env::var("WORDROUND_SNAPSHOT_INTERVAL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.persistence.snapshot_interval_secs = n;
        }
        if let Ok(val) = std::env::var("WORDROUND_SNAPSHOT_KEEP_COUNT")
            && let Ok(n) = val.parse::<usize>()
        {
            config.persistence.snapshot_keep_count = n;
        }
        if let Ok(val) = std::env::var("WORDROUND_FINISHED_RETENTION_HOURS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.recovery.finished_retention_hours = n;
        }

        config
    }
}
