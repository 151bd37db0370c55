use serde::{Deserialize, Serialize};

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`            : printed normally via `&self.field_name`
/// - `redact(field_name)`    : `String` field: shows `[empty]` or `[REDACTED]`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact($field:ident)) => {
        $builder.field(
            stringify!($field),
            &if $self.$field.is_empty() {
                "[empty]"
            } else {
                "[REDACTED]"
            },
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Data store
// ---------------------------------------------------------------------------

/// Hosted PostgREST-compatible data store holding leads, messages and campaigns.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "anonKey")]
    pub anon_key: String,
}

redact_debug!(StoreConfig, url, redact(anon_key),);

// ---------------------------------------------------------------------------
// Message backend
// ---------------------------------------------------------------------------

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the message-sending backend; the webhook lives at `{url}/webhook`.
    #[serde(default = "default_backend_url")]
    pub url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
        }
    }
}

impl BackendConfig {
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", crate::utils::trim_base_url(&self.url))
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// HMAC-SHA256 secret for `POST /api/changes`. Empty accepts unsigned payloads.
    #[serde(default, rename = "changesSecret")]
    pub changes_secret: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            changes_secret: String::new(),
        }
    }
}

impl GatewayConfig {
    /// Where a local client reaches this gateway. A wildcard bind address is
    /// reached through loopback.
    pub fn base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1",
            host => host,
        };
        format!("http://{}:{}", host, self.port)
    }
}

redact_debug!(GatewayConfig, host, port, redact(changes_secret),);

// ---------------------------------------------------------------------------
// WhatsApp (Evolution API) credentials forwarded with outbound actions
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct WhatsAppConfig {
    #[serde(default, rename = "serverUrl")]
    pub server_url: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    /// Ask the backend to simulate sends instead of delivering them.
    #[serde(default, rename = "dryRun")]
    pub dry_run: bool,
}

redact_debug!(WhatsAppConfig, server_url, instance, redact(api_key), dry_run,);

// ---------------------------------------------------------------------------
// Conversation sync
// ---------------------------------------------------------------------------

pub const MIN_REFETCH_INTERVAL_MS: u64 = 2_000;
pub const MAX_REFETCH_INTERVAL_MS: u64 = 5_000;
pub const MIN_STALE_TIME_MS: u64 = 1_000;
pub const MAX_STALE_TIME_MS: u64 = 4_000;

fn default_refetch_interval_ms() -> u64 {
    5_000
}

fn default_stale_time_ms() -> u64 {
    4_000
}

fn default_recent_window_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_refetch_interval_ms", rename = "refetchIntervalMs")]
    pub refetch_interval_ms: u64,
    #[serde(default = "default_stale_time_ms", rename = "staleTimeMs")]
    pub stale_time_ms: u64,
    #[serde(default = "default_recent_window_hours", rename = "recentWindowHours")]
    pub recent_window_hours: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refetch_interval_ms: default_refetch_interval_ms(),
            stale_time_ms: default_stale_time_ms(),
            recent_window_hours: default_recent_window_hours(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    /// Validate ranges and URL shapes. Store credentials are checked
    /// separately when the store is initialized, so commands that never
    /// touch the store still run with an empty `store` section.
    pub fn validate(&self) -> anyhow::Result<()> {
        let sync = &self.sync;
        if !(MIN_REFETCH_INTERVAL_MS..=MAX_REFETCH_INTERVAL_MS).contains(&sync.refetch_interval_ms)
        {
            anyhow::bail!(
                "sync.refetchIntervalMs must be between {} and {} (got {})",
                MIN_REFETCH_INTERVAL_MS,
                MAX_REFETCH_INTERVAL_MS,
                sync.refetch_interval_ms
            );
        }
        if !(MIN_STALE_TIME_MS..=MAX_STALE_TIME_MS).contains(&sync.stale_time_ms) {
            anyhow::bail!(
                "sync.staleTimeMs must be between {} and {} (got {})",
                MIN_STALE_TIME_MS,
                MAX_STALE_TIME_MS,
                sync.stale_time_ms
            );
        }
        if sync.stale_time_ms >= sync.refetch_interval_ms {
            anyhow::bail!(
                "sync.staleTimeMs ({}) must be below sync.refetchIntervalMs ({})",
                sync.stale_time_ms,
                sync.refetch_interval_ms
            );
        }
        if sync.recent_window_hours == 0 {
            anyhow::bail!("sync.recentWindowHours must be at least 1");
        }

        validate_http_url("backend.url", &self.backend.url)?;
        if !self.store.url.is_empty() {
            validate_http_url("store.url", &self.store.url)?;
        }
        if self.gateway.port == 0 {
            anyhow::bail!("gateway.port must be non-zero");
        }
        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> anyhow::Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", field, value, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => anyhow::bail!("{} must use http or https (got {})", field, other),
    }
}

#[cfg(test)]
mod tests;
