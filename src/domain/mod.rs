// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that every other layer
// agrees on. Nothing in here touches burn, files or the CLI.
//
//   example.rs -> Example (one labelled pair) and Batch
//   traits.rs  -> BatchSource / Scorer / TrainableModel seams
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Labelled (context, utterance) examples and batches of them
pub mod example;

/// Seams the training loop is written against
pub mod traits;
