// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Orchestrates the other layers for one command.
//
// Rules for this layer:
//   - No model math here (that's Layer 5)
//   - No argument parsing or printing here (that's Layer 1)
//   - Only workflow coordination and configuration
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Run configuration and the training workflow
pub mod train_use_case;

// Scoring a checkpoint on the test split
pub mod test_use_case;
