// ============================================================
// Layer 5 - Bi-Encoder Model
// ============================================================
// Context and candidate utterance go through the same encoder
// tower, and a learned bilinear form compares the two codes:
//
//   tokens ──► embeddings ──► Linear ──► tanh ──► masked mean ──► c
//   tokens ──► embeddings ──► Linear ──► tanh ──► masked mean ──► r
//
//   logit = c · (M r)        probability = sigmoid(logit)
//
// The embeddings are looked up by the batcher, so the model
// itself only owns the encoder and M.
//
// Reference: Lowe et al. (2015) The Ubuntu Dialogue Corpus

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::{sigmoid, tanh},
};

use crate::data::batcher::PairBatch;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct BiEncoderConfig {
    pub embed_dim:  usize,
    pub hidden_dim: usize,
    pub max_len:    usize,
}

impl BiEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BiEncoder<B> {
        let encoder  = LinearConfig::new(self.embed_dim, self.hidden_dim).init(device);
        let bilinear = LinearConfig::new(self.hidden_dim, self.hidden_dim)
            .with_bias(false)
            .init(device);
        BiEncoder { encoder, bilinear, hidden_dim: self.hidden_dim }
    }
}

/// Context and utterance are encoded by the same tower, then compared
/// with a learned bilinear form: logit = c · (M r).
#[derive(Module, Debug)]
pub struct BiEncoder<B: Backend> {
    pub encoder:    Linear<B>,
    pub bilinear:   Linear<B>,
    pub hidden_dim: usize,
}

impl<B: Backend> BiEncoder<B> {
    /// embedded: [batch, len, embed], mask: [batch, len] → [batch, hidden]
    pub fn encode(&self, embedded: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, _, _] = embedded.dims();

        let hidden = tanh(self.encoder.forward(embedded));
        let summed = (hidden * mask.clone().unsqueeze_dim::<3>(2))
            .sum_dim(1)
            .reshape([batch_size, self.hidden_dim]);

        // Mean over real tokens only; an all-padding row stays at zero
        let counts = mask.sum_dim(1).clamp_min(1.0);
        summed / counts
    }

    /// One raw compatibility logit per pair: [batch]
    pub fn forward(&self, batch: &PairBatch<B>) -> Tensor<B, 1> {
        let context   = self.encode(batch.context.clone(), batch.context_mask.clone());
        let utterance = self.encode(batch.utterance.clone(), batch.utterance_mask.clone());
        let [batch_size, _] = context.dims();

        (context * self.bilinear.forward(utterance))
            .sum_dim(1)
            .reshape([batch_size])
    }

    /// Probability that each utterance is the true response.
    pub fn probabilities(&self, batch: &PairBatch<B>) -> Tensor<B, 1> {
        sigmoid(self.forward(batch))
    }

    /// Mean logistic loss, written in the overflow-safe form
    /// max(x, 0) - x·y + ln(1 + e^-|x|).
    pub fn forward_loss(&self, batch: &PairBatch<B>) -> Tensor<B, 1> {
        let logits = self.forward(batch);
        let softplus_tail = logits.clone().abs().neg().exp().add_scalar(1.0).log();
        (logits.clone().clamp_min(0.0) - logits * batch.labels.clone() + softplus_tail).mean()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::PairBatcher;
    use crate::domain::example::{Batch, Example};
    use crate::infra::embedding_store::EmbeddingTable;
    use burn::backend::NdArray;
    use std::sync::Arc;

    type TestBackend = NdArray;

    fn tensors(device: &<TestBackend as Backend>::Device) -> PairBatch<TestBackend> {
        let table = Arc::new(
            EmbeddingTable::from_rows(2, vec![0.0, 0.0, 0.5, -0.5, 1.0, 0.25]).unwrap(),
        );
        let batcher = PairBatcher::<TestBackend>::new(table, 3, device.clone());
        let example = |context_len: i64, label: i64| Example {
            context:       vec![1, 2, 0],
            utterance:     vec![2, 1, 0],
            context_len,
            utterance_len: 2,
            label,
        };
        batcher
            .batch(&Batch::new(vec![example(2, 1), example(1, 0), example(0, 0)]))
            .unwrap()
    }

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        let model  = BiEncoderConfig::new(2, 4, 3).init::<TestBackend>(&device);
        let batch  = tensors(&device);

        let encoded = model.encode(batch.context.clone(), batch.context_mask.clone());
        assert_eq!(encoded.dims(), [3, 4]);
        assert_eq!(model.forward(&batch).dims(), [3]);
    }

    #[test]
    fn test_probabilities_are_in_unit_interval() {
        let device = Default::default();
        let model  = BiEncoderConfig::new(2, 4, 3).init::<TestBackend>(&device);
        let probs: Vec<f32> = model
            .probabilities(&tensors(&device))
            .into_data()
            .iter::<f32>()
            .collect();
        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_all_padding_context_encodes_to_zero() {
        let device  = Default::default();
        let model   = BiEncoderConfig::new(2, 4, 3).init::<TestBackend>(&device);
        let batch   = tensors(&device);
        let encoded: Vec<f32> = model
            .encode(batch.context, batch.context_mask)
            .into_data()
            .iter::<f32>()
            .collect();
        // Third example has context_len 0
        assert!(encoded[8..12].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_loss_is_finite_and_positive() {
        let device = Default::default();
        let model  = BiEncoderConfig::new(2, 4, 3).init::<TestBackend>(&device);
        let loss: f64 = model.forward_loss(&tensors(&device)).into_scalar().elem::<f64>();
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }
}
