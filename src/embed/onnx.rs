//! Neural embedding backend running a sentence-transformer ONNX model.
//!
//! Token vectors from the model's last hidden state are mean-pooled under
//! the attention mask, folded to the configured dimension when the model
//! dimension differs, and L2-normalized.

use crate::embed::Embedder;
use crate::error::{Error, Result};
use log::debug;
use ndarray::{Array2, CowArray};
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

/// Maximum sequence length fed to the model.
const MAX_SEQ_LENGTH: usize = 256;

/// ONNX-backed embedding provider.
pub struct OnnxEmbedder {
    tokenizer: Tokenizer,
    session: Arc<Mutex<Session>>,
    dimension: usize,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OnnxEmbedder {
    /// Loads the model and its tokenizer. `tokenizer_path` is the
    /// directory containing `tokenizer.json`.
    pub fn new(model_path: &Path, tokenizer_path: &Path, dimension: usize) -> Result<Self> {
        let tokenizer_json = tokenizer_path.join("tokenizer.json");
        debug!("Loading tokenizer from {}", tokenizer_json.display());
        let tokenizer = Tokenizer::from_file(&tokenizer_json)
            .map_err(|e| Error::EmbedderUnavailable(format!("tokenizer load failed: {}", e)))?;

        debug!("Loading ONNX model from {}", model_path.display());
        let environment = Environment::builder()
            .with_name("codequery-embedder")
            .build()
            .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?
            .into_arc();
        let session = SessionBuilder::new(&environment)
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
            .and_then(|b| b.with_intra_threads(num_cpus::get() as i16))
            .and_then(|b| b.with_model_from_file(model_path))
            .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?;

        Ok(Self {
            tokenizer,
            session: Arc::new(Mutex::new(session)),
            dimension,
        })
    }

    /// Tokenizes one text into padded id + mask rows.
    fn prepare_inputs(&self, text: &str) -> Result<(Vec<i64>, Vec<i64>)> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::EmbedderUnavailable(format!("tokenize failed: {}", e)))?;
        let mut input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mut attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        input_ids.truncate(MAX_SEQ_LENGTH);
        attention_mask.truncate(MAX_SEQ_LENGTH);
        while input_ids.len() < MAX_SEQ_LENGTH {
            input_ids.push(0);
            attention_mask.push(0);
        }
        Ok((input_ids, attention_mask))
    }

    /// Mean-pools the hidden states under the mask, folds to the target
    /// dimension, and normalizes.
    fn pool(&self, hidden: &[f32], model_dim: usize, mask: &[i64]) -> Vec<f32> {
        let mut pooled = vec![0.0f32; model_dim];
        let mut count = 0.0f32;
        for (row, &m) in mask.iter().enumerate() {
            if m == 0 {
                continue;
            }
            count += 1.0;
            let offset = row * model_dim;
            for d in 0..model_dim {
                pooled[d] += hidden[offset + d];
            }
        }
        if count > 0.0 {
            for x in pooled.iter_mut() {
                *x /= count;
            }
        }

        // Fold to the configured dimension when they differ.
        let mut projected = vec![0.0f32; self.dimension];
        for (i, &x) in pooled.iter().enumerate() {
            projected[i % self.dimension] += x;
        }

        let norm: f32 = projected.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in projected.iter_mut() {
                *x /= norm;
            }
        }
        projected
    }
}

impl Embedder for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &'static str {
        "onnx"
    }

    fn warmup(&self) -> Result<()> {
        // First inference pays graph initialization; do it off the query
        // path.
        self.encode("warmup").map(|_| ())
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let (input_ids, attention_mask) = self.prepare_inputs(text)?;

        let ids_array: CowArray<i64, _> =
            Array2::from_shape_vec((1, MAX_SEQ_LENGTH), input_ids)
                .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?
                .into_dyn()
                .into();
        let mask_array: CowArray<i64, _> =
            Array2::from_shape_vec((1, MAX_SEQ_LENGTH), attention_mask.clone())
                .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?
                .into_dyn()
                .into();

        let session = self
            .session
            .lock()
            .map_err(|e| Error::Lock(e.to_string()))?;
        let inputs = vec![
            Value::from_array(session.allocator(), &ids_array)
                .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?,
            Value::from_array(session.allocator(), &mask_array)
                .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?,
        ];
        let outputs = session
            .run(inputs)
            .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?;

        // First output: last_hidden_state of shape [1, seq, model_dim].
        let tensor = outputs[0]
            .try_extract::<f32>()
            .map_err(|e| Error::EmbedderUnavailable(e.to_string()))?;
        let view = tensor.view();
        let flat: Vec<f32> = view.iter().copied().collect();
        if flat.is_empty() || flat.len() % MAX_SEQ_LENGTH != 0 {
            return Err(Error::EmbedderUnavailable(format!(
                "unexpected output tensor length {}",
                flat.len()
            )));
        }
        let model_dim = flat.len() / MAX_SEQ_LENGTH;
        Ok(self.pool(&flat, model_dim, &attention_mask))
    }
}
