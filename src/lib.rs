#![warn(clippy::pedantic)]
// Noisy doc/signature lints; they would require annotating every pub function
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference: keep format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Scores and row counts are small; the casts are range-checked where it matters
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
// Module structure: leads::LeadFilter, campaigns::CampaignDraft and friends
#![allow(clippy::module_name_repetitions)]

pub mod campaigns;
pub mod cli;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod leads;
pub mod models;
pub mod outbound;
pub mod overlay;
pub mod store;
pub mod sync;
pub(crate) mod utils;
pub mod viewer;

/// Re-exports for fuzz targets. Not part of the public API.
#[doc(hidden)]
pub mod fuzz_api {
    /// Wrapper around `gateway::validate_webhook_signature` for fuzz targets.
    pub fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
        crate::gateway::validate_webhook_signature(secret, signature, body)
    }
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
