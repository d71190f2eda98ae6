// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Cross-cutting pieces that touch the filesystem:
//
//   checkpoint.rs      - the checkpoint directory: atomic saves,
//                        keep-1 pruning, run config, latest pointer
//
//   embedding_store.rs - the word-embedding table, built once per
//                        process and shared by every model
//
//   metrics.rs         - CSV history of every evaluation
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Checkpoint directory management
pub mod checkpoint;

/// Shared embedding table
pub mod embedding_store;

/// Evaluation history CSV logger
pub mod metrics;
