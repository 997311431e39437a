//! Centralized default constants for the tidy system.
//!
//! **This module is the single source of truth** for all shared default values.
//! Every crate and the CLI reference these constants instead of defining their
//! own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section.

// =============================================================================
// TRIGGERING
// =============================================================================

/// Idle time after the last content change before an organization pass fires.
pub const IDLE_TIMEOUT_SECS: u64 = 30;

/// Minimum spacing between two attempts to enter the running state.
pub const DEBOUNCE_MS: u64 = 1_000;

// =============================================================================
// ROUTING
// =============================================================================

/// Catch-all destination used when classification yields nothing usable.
pub const DEFAULT_DESTINATION: &str = "/Inbox";

/// Maximum characters of the source document sent as disambiguation context.
pub const SOURCE_EXCERPT_CHARS: usize = 2_000;

/// Maximum characters of user-supplied organization rules sent to the classifier.
pub const RULES_MAX_CHARS: usize = 4_000;

/// Path separator used by routed chunk target paths.
pub const PATH_SEPARATOR: char = '/';

// =============================================================================
// HISTORY
// =============================================================================

/// Number of change records kept in the revert history.
pub const HISTORY_CAPACITY: usize = 10;

/// Profile metadata key under which the change history is persisted.
pub const HISTORY_METADATA_KEY: &str = "organize_history";

// =============================================================================
// EVENTS
// =============================================================================

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default OpenAI-compatible base URL.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Primary classification model.
pub const PRIMARY_MODEL: &str = "gpt-oss:20b";

/// Secondary model tried once when the primary fails.
pub const FALLBACK_MODEL: &str = "granite4:3b";

/// Timeout for classification requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Classification calls slower than this are logged as slow.
pub const SLOW_GENERATION_MS: u64 = 30_000;

// =============================================================================
// DATABASE
// =============================================================================

/// Default maximum number of pooled database connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Default database connection timeout in seconds.
pub const DB_CONNECT_TIMEOUT_SECS: u64 = 30;
