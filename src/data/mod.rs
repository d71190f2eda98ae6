// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything between record files on disk and tensors in the
// model:
//
//   record files (.jsonl)
//       │
//       ▼
//   RecordReader   → streams and validates one example at a time
//       │
//       ▼
//   DataFeed       → shuffle buffer, batching, pass counting
//       │
//       ▼
//   PairBatcher    → embedding lookup, masks, burn tensors
//
// The first two stages know nothing about burn; only the
// batcher does, and only the model layer calls it.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Streams fixed-shape records out of JSON-lines files
pub mod loader;

/// Pull-based batch feeds for training and evaluation
pub mod feed;

/// Builds burn tensors from domain batches
pub mod batcher;
