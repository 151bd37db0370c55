use super::schema::Config;
use tracing::debug;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// All known credential slot names.
        pub const CREDENTIAL_NAMES: &[&str] = &[$($name),*];

        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply overrides from `lookup` (env var name → value).
        ///
        /// Any value that is present and non-empty overwrites the config field,
        /// so secrets can be injected without touching the config file.
        pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
        where
            F: Fn(&str) -> Option<String>,
        {
            $(
                if let Some(val) = lookup($env)
                    && !val.is_empty()
                {
                    debug!("config override for {} from {}", $name, $env);
                    config.$($path).+ = val;
                }
            )*
            if let Some(val) = lookup(DRY_RUN_ENV_VAR)
                && !val.is_empty()
            {
                config.whatsapp.dry_run = parse_flag(&val);
            }
        }
    };
}

/// Boolean override for `whatsapp.dryRun`.
pub const DRY_RUN_ENV_VAR: &str = "LEADDESK_WHATSAPP_DRY_RUN";

define_credentials! {
    // Data store
    "store-url",               "LEADDESK_STORE_URL"              => store.url;
    "store-key",               "LEADDESK_STORE_KEY"              => store.anon_key;
    // Message backend
    "backend-url",             "LEADDESK_BACKEND_URL"            => backend.url;
    // WhatsApp (Evolution API)
    "evolution-server-url",    "LEADDESK_EVOLUTION_SERVER_URL"   => whatsapp.server_url;
    "evolution-instance",      "LEADDESK_EVOLUTION_INSTANCE"     => whatsapp.instance;
    "evolution-api-key",       "LEADDESK_EVOLUTION_API_KEY"      => whatsapp.api_key;
    // Gateway
    "changes-secret",          "LEADDESK_CHANGES_SECRET"         => gateway.changes_secret;
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
