//! Structured logging schema and field name constants for tidy.
//!
//! All crates use these constants for consistent structured logging fields so
//! a failed organization pass can be replayed from its log lines alone.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Pipeline failure that leaves content unfiled |
//! | WARN  | Recoverable issue, automatic fallback applied (model, Inbox, skipped chunk) |
//! | INFO  | Run completions, created destinations, reverts |
//! | DEBUG | Decision points (trigger dropped, chunk dropped, path resolved) |
//! | TRACE | Per-block iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "organize", "db", "inference", "events"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "trigger", "router", "applier", "versions", "ollama"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "route", "apply_chunks", "revert", "invoke"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Source or destination document UUID.
pub const DOCUMENT_ID: &str = "document_id";

/// Block identifier inside a document content tree.
pub const BLOCK_ID: &str = "block_id";

/// Change record UUID.
pub const CHANGE_ID: &str = "change_id";

/// Routed chunk target path.
pub const TARGET_PATH: &str = "target_path";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of routed chunks.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Number of unorganized blocks sent to the classifier.
pub const BLOCK_COUNT: &str = "block_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for classification.
pub const MODEL: &str = "model";

/// Which attempt produced a result ("primary", "fallback").
pub const ATTEMPT: &str = "attempt";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";

/// Destination paths touched by a run.
pub const CHANGED_PATHS: &str = "changed_paths";
