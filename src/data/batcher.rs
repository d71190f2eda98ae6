// ============================================================
// Layer 4 - Pair Batcher
// ============================================================
// Converts a domain Batch into the tensors the bi-encoder eats.
//
// This is where token ids meet the shared embedding table:
// every id is replaced by its vector, so the model receives
//
//   context        [batch, max_len, embed_dim]   f32
//   context_mask   [batch, max_len]              1.0 = real token
//   utterance      [batch, max_len, embed_dim]
//   utterance_mask [batch, max_len]
//   labels         [batch]                       0.0 / 1.0
//
// The masks come from context_len / utterance_len (clamped into
// 0..=max_len), not from looking for padding ids, because a
// padding id can legitimately appear inside a sequence.
//
// Reference: Burn Book §4 (Batcher)

use anyhow::{bail, Result};
use burn::{prelude::*, tensor::TensorData};
use std::sync::Arc;

use crate::domain::example::Batch;
use crate::infra::embedding_store::EmbeddingTable;

// ─── PairBatch ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct PairBatch<B: Backend> {
    pub context:        Tensor<B, 3>,
    pub context_mask:   Tensor<B, 2>,
    pub utterance:      Tensor<B, 3>,
    pub utterance_mask: Tensor<B, 2>,
    pub labels:         Tensor<B, 1>,
}

// ─── PairBatcher ──────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct PairBatcher<B: Backend> {
    table:   Arc<EmbeddingTable>,
    max_len: usize,
    device:  B::Device,
}

impl<B: Backend> PairBatcher<B> {
    pub fn new(table: Arc<EmbeddingTable>, max_len: usize, device: B::Device) -> Self {
        Self { table, max_len, device }
    }

    pub fn batch(&self, batch: &Batch) -> Result<PairBatch<B>> {
        if batch.is_empty() {
            bail!("cannot build tensors for an empty batch");
        }

        let size = batch.len();
        let dim  = self.table.dim();

        let mut context_flat   = Vec::with_capacity(size * self.max_len * dim);
        let mut utterance_flat = Vec::with_capacity(size * self.max_len * dim);
        let mut context_mask   = Vec::with_capacity(size * self.max_len);
        let mut utterance_mask = Vec::with_capacity(size * self.max_len);
        let mut labels         = Vec::with_capacity(size);

        for example in &batch.examples {
            if example.context.len() != self.max_len || example.utterance.len() != self.max_len {
                bail!("example sequences must be exactly {} ids long", self.max_len);
            }
            self.table.lookup_into(&example.context, &mut context_flat)?;
            self.table.lookup_into(&example.utterance, &mut utterance_flat)?;

            push_mask(&mut context_mask, example.context_len_clamped(self.max_len), self.max_len);
            push_mask(&mut utterance_mask, example.utterance_len_clamped(self.max_len), self.max_len);

            labels.push(if example.is_positive() { 1.0 } else { 0.0 });
        }

        Ok(PairBatch {
            context:        self.float3(context_flat, [size, self.max_len, dim]),
            context_mask:   self.float2(context_mask, [size, self.max_len]),
            utterance:      self.float3(utterance_flat, [size, self.max_len, dim]),
            utterance_mask: self.float2(utterance_mask, [size, self.max_len]),
            labels:         Tensor::<B, 1>::from_data(TensorData::new(labels, [size]), &self.device),
        })
    }

    fn float3(&self, values: Vec<f32>, shape: [usize; 3]) -> Tensor<B, 3> {
        Tensor::<B, 3>::from_data(TensorData::new(values, shape), &self.device)
    }

    fn float2(&self, values: Vec<f32>, shape: [usize; 2]) -> Tensor<B, 2> {
        Tensor::<B, 2>::from_data(TensorData::new(values, shape), &self.device)
    }
}

fn push_mask(mask: &mut Vec<f32>, len: usize, max_len: usize) {
    mask.extend((0..max_len).map(|i| if i < len { 1.0 } else { 0.0 }));
}
