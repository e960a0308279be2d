//! Inference for the pretrained stacked LSTM price model.
//!
//! The artifact is a JSON export of Keras layer weights:
//!
//! ```json
//! { "name": "pangan_lstm", "sequence_length": 30, "n_features": 28,
//!   "layers": [
//!     { "type": "lstm", "units": 64, "return_sequences": true,
//!       "kernel": [[...]], "recurrent_kernel": [[...]], "bias": [...] },
//!     { "type": "dropout", "rate": 0.2 },
//!     { "type": "lstm", "units": 32, "kernel": [[...]], "recurrent_kernel": [[...]], "bias": [...] },
//!     { "type": "dense", "kernel": [[...]], "bias": [...] } ] }
//! ```
//!
//! Kernels are `(input, 4 * units)` with gates in i, f, c, o order.

use crate::feature_schema::FeatureVector;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Next-step predictor over a window of scaled feature rows.
pub trait SequenceModel: Send + Sync {
    fn id(&self) -> &str;

    fn sequence_length(&self) -> usize;

    fn n_features(&self) -> usize;

    /// Scaled price for the step after `window`, or `None` if the window
    /// does not fit the model.
    fn predict_next(&self, window: &[FeatureVector]) -> Option<f64>;

    fn info(&self) -> ModelInfo {
        ModelInfo {
            id: self.id().to_string(),
            sequence_length: self.sequence_length(),
            n_features: self.n_features(),
            lstm_layers: None,
            parameter_count: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelArtifact {
    #[serde(default = "default_model_name")]
    name: String,
    sequence_length: usize,
    n_features: usize,
    layers: Vec<LayerArtifact>,
}

fn default_model_name() -> String {
    "lstm".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LayerArtifact {
    Lstm {
        units: usize,
        kernel: Vec<Vec<f64>>,
        recurrent_kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default)]
        return_sequences: bool,
    },
    Dropout {
        #[serde(default)]
        rate: f64,
    },
    Dense {
        kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
        #[serde(default)]
        activation: DenseActivation,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenseActivation {
    #[default]
    Linear,
    Relu,
}

#[derive(Debug)]
struct LstmLayer {
    units: usize,
    input_dim: usize,
    kernel: Vec<f64>,
    recurrent: Vec<f64>,
    bias: Vec<f64>,
    return_sequences: bool,
}

impl LstmLayer {
    fn forward(&self, inputs: &[Vec<f64>]) -> Activations {
        let gates = 4 * self.units;
        let mut hidden = vec![0.0; self.units];
        let mut cell = vec![0.0; self.units];
        let mut outputs = Vec::with_capacity(if self.return_sequences {
            inputs.len()
        } else {
            1
        });
        let mut z = vec![0.0; gates];

        for x in inputs {
            z.copy_from_slice(&self.bias);
            for (row, value) in x.iter().enumerate() {
                let weights = &self.kernel[row * gates..(row + 1) * gates];
                for (slot, weight) in z.iter_mut().zip(weights) {
                    *slot += value * weight;
                }
            }
            for (row, value) in hidden.iter().enumerate() {
                let weights = &self.recurrent[row * gates..(row + 1) * gates];
                for (slot, weight) in z.iter_mut().zip(weights) {
                    *slot += value * weight;
                }
            }

            let u = self.units;
            for j in 0..u {
                let input_gate = sigmoid(z[j]);
                let forget_gate = sigmoid(z[u + j]);
                let candidate = z[2 * u + j].tanh();
                let output_gate = sigmoid(z[3 * u + j]);
                cell[j] = forget_gate * cell[j] + input_gate * candidate;
                hidden[j] = output_gate * cell[j].tanh();
            }

            if self.return_sequences {
                outputs.push(hidden.clone());
            }
        }

        if self.return_sequences {
            Activations::Sequence(outputs)
        } else {
            Activations::Vector(hidden)
        }
    }

    fn parameter_count(&self) -> usize {
        self.kernel.len() + self.recurrent.len() + self.bias.len()
    }
}

#[derive(Debug)]
struct DenseLayer {
    input_dim: usize,
    output_dim: usize,
    kernel: Vec<f64>,
    bias: Vec<f64>,
    activation: DenseActivation,
}

impl DenseLayer {
    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut output = self.bias.clone();
        for (row, value) in input.iter().enumerate() {
            let weights = &self.kernel[row * self.output_dim..(row + 1) * self.output_dim];
            for (slot, weight) in output.iter_mut().zip(weights) {
                *slot += value * weight;
            }
        }
        if self.activation == DenseActivation::Relu {
            for value in output.iter_mut() {
                *value = value.max(0.0);
            }
        }
        output
    }

    fn parameter_count(&self) -> usize {
        self.kernel.len() + self.bias.len()
    }
}

#[derive(Debug)]
enum Layer {
    Lstm(LstmLayer),
    Dense(DenseLayer),
}

enum Activations {
    Sequence(Vec<Vec<f64>>),
    Vector(Vec<f64>),
}

/// Summary of a loaded network, reported by the health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub sequence_length: usize,
    pub n_features: usize,
    pub lstm_layers: Option<usize>,
    pub parameter_count: Option<usize>,
}

#[derive(Debug)]
pub struct LstmNetwork {
    name: String,
    sequence_length: usize,
    n_features: usize,
    layers: Vec<Layer>,
}

impl LstmNetwork {
    pub fn from_json(text: &str) -> Result<Self> {
        let artifact: ModelArtifact =
            serde_json::from_str(text).context("LSTM artifact is not valid JSON")?;
        Self::from_artifact(artifact)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(anyhow!("LSTM model file not found: {}", path.display()));
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read LSTM model {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to load LSTM model {}", path.display()))
    }

    fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        if artifact.sequence_length == 0 {
            return Err(anyhow!("LSTM artifact sequence_length must be positive"));
        }
        if artifact.n_features == 0 {
            return Err(anyhow!("LSTM artifact n_features must be positive"));
        }

        let mut layers = Vec::new();
        let mut width = artifact.n_features;
        let mut is_sequence = true;

        for (idx, layer) in artifact.layers.into_iter().enumerate() {
            match layer {
                LayerArtifact::Lstm {
                    units,
                    kernel,
                    recurrent_kernel,
                    bias,
                    return_sequences,
                } => {
                    if !is_sequence {
                        return Err(anyhow!(
                            "layer {idx}: LSTM needs sequence input; set return_sequences on the previous LSTM"
                        ));
                    }
                    if units == 0 {
                        return Err(anyhow!("layer {idx}: LSTM units must be positive"));
                    }
                    let gates = 4 * units;
                    let kernel = flatten_matrix(kernel, width, gates, idx, "kernel")?;
                    let recurrent =
                        flatten_matrix(recurrent_kernel, units, gates, idx, "recurrent_kernel")?;
                    check_len(&bias, gates, idx, "bias")?;
                    layers.push(Layer::Lstm(LstmLayer {
                        units,
                        input_dim: width,
                        kernel,
                        recurrent,
                        bias,
                        return_sequences,
                    }));
                    width = units;
                    is_sequence = return_sequences;
                }
                LayerArtifact::Dropout { rate } => {
                    if !(0.0..1.0).contains(&rate) {
                        return Err(anyhow!("layer {idx}: dropout rate {rate} outside [0, 1)"));
                    }
                }
                LayerArtifact::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    if is_sequence {
                        return Err(anyhow!(
                            "layer {idx}: dense layer needs the preceding LSTM to return its last state only"
                        ));
                    }
                    let output_dim = bias.len();
                    if output_dim == 0 {
                        return Err(anyhow!("layer {idx}: dense bias is empty"));
                    }
                    let kernel = flatten_matrix(kernel, width, output_dim, idx, "kernel")?;
                    layers.push(Layer::Dense(DenseLayer {
                        input_dim: width,
                        output_dim,
                        kernel,
                        bias,
                        activation,
                    }));
                    width = output_dim;
                }
            }
        }

        if !layers.iter().any(|layer| matches!(layer, Layer::Lstm(_))) {
            return Err(anyhow!("LSTM artifact contains no LSTM layer"));
        }
        if is_sequence || width != 1 {
            return Err(anyhow!(
                "LSTM artifact must end in a single scalar output (got width {width})"
            ));
        }

        Ok(Self {
            name: artifact.name,
            sequence_length: artifact.sequence_length,
            n_features: artifact.n_features,
            layers,
        })
    }

    fn forward(&self, window: &[FeatureVector]) -> Option<f64> {
        let mut activations = Activations::Sequence(
            window
                .iter()
                .map(|row| row.values[..self.n_features].to_vec())
                .collect(),
        );

        for layer in &self.layers {
            activations = match (layer, activations) {
                (Layer::Lstm(lstm), Activations::Sequence(inputs)) => {
                    debug_assert!(inputs.iter().all(|row| row.len() == lstm.input_dim));
                    lstm.forward(&inputs)
                }
                (Layer::Dense(dense), Activations::Vector(input)) => {
                    debug_assert_eq!(input.len(), dense.input_dim);
                    Activations::Vector(dense.forward(&input))
                }
                _ => return None,
            };
        }

        match activations {
            Activations::Vector(output) => output.first().copied(),
            Activations::Sequence(_) => None,
        }
    }
}

impl SequenceModel for LstmNetwork {
    fn id(&self) -> &str {
        &self.name
    }

    fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_next(&self, window: &[FeatureVector]) -> Option<f64> {
        if window.len() != self.sequence_length {
            return None;
        }
        if window
            .first()
            .map_or(true, |row| row.values.len() < self.n_features)
        {
            return None;
        }
        self.forward(window)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            id: self.name.clone(),
            sequence_length: self.sequence_length,
            n_features: self.n_features,
            lstm_layers: Some(
                self.layers
                    .iter()
                    .filter(|layer| matches!(layer, Layer::Lstm(_)))
                    .count(),
            ),
            parameter_count: Some(
                self.layers
                    .iter()
                    .map(|layer| match layer {
                        Layer::Lstm(lstm) => lstm.parameter_count(),
                        Layer::Dense(dense) => dense.parameter_count(),
                    })
                    .sum(),
            ),
        }
    }
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}

fn check_len(values: &[f64], expected: usize, layer: usize, name: &str) -> Result<()> {
    if values.len() != expected {
        return Err(anyhow!(
            "layer {layer}: {name} has {} value(s), expected {expected}",
            values.len()
        ));
    }
    Ok(())
}

fn flatten_matrix(
    matrix: Vec<Vec<f64>>,
    rows: usize,
    cols: usize,
    layer: usize,
    name: &str,
) -> Result<Vec<f64>> {
    if matrix.len() != rows {
        return Err(anyhow!(
            "layer {layer}: {name} has {} row(s), expected {rows}",
            matrix.len()
        ));
    }
    let mut flat = Vec::with_capacity(rows * cols);
    for row in matrix {
        check_len(&row, cols, layer, name)?;
        flat.extend(row);
    }
    if flat.iter().any(|value| !value.is_finite()) {
        return Err(anyhow!("layer {layer}: {name} contains non-finite weights"));
    }
    Ok(flat)
}
