//! nn.rs — fixed-shape dense feed-forward controller (7-5-3-2)
//!
//! A genome of 66 genes lays out three dense layers in order; within a layer
//! the first `neurons` genes are biases, the rest are row-major weights.
//! The activation is applied after every layer, output included.

use crate::{DomainError, Fnum};

/// (inputs, neurons) per layer, evaluated left to right.
pub const LAYER_SHAPES: [(usize, usize); 3] = [(7, 5), (5, 3), (3, 2)];

/// Total gene count: Σ neurons·(inputs + 1) = 40 + 18 + 8.
pub const GENOME_LEN: usize = 66;

pub const INPUTS: usize = 7;
pub const OUTPUTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    ReLU,
    Sigmoid,
    Tanh,
}

impl Activation {
    pub fn apply(&self, v: Fnum) -> Fnum {
        match self {
            Activation::ReLU => v.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-v).exp()),
            Activation::Tanh => v.tanh(),
        }
    }
}

// ── Layers ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Layer {
    inputs: usize,
    neurons: usize,
    /// Biases first, then row-major weights, as in the genome itself.
    genes: Vec<Fnum>,
}

impl Layer {
    fn forward(&self, input: &[Fnum], activation: Activation, out: &mut Vec<Fnum>) {
        let (biases, weights) = self.genes.split_at(self.neurons);
        out.clear();
        for n in 0..self.neurons {
            let row = &weights[n * self.inputs..(n + 1) * self.inputs];
            let mut acc = biases[n];
            for (w, x) in row.iter().zip(input) {
                acc += w * x;
            }
            out.push(activation.apply(acc));
        }
    }
}

// ── Network ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Dff {
    layers: [Layer; 3],
    activation: Activation,
}

impl Dff {
    /// Slice a 66-gene genome into the three layers.
    pub fn from_genes(genes: &[Fnum]) -> Result<Self, DomainError> {
        Self::with_activation(genes, Activation::default())
    }

    pub fn with_activation(genes: &[Fnum], activation: Activation) -> Result<Self, DomainError> {
        if genes.len() != GENOME_LEN {
            return Err(DomainError::BadGenomeLength(genes.len()));
        }
        let mut offset = 0;
        let layers = LAYER_SHAPES.map(|(inputs, neurons)| {
            let size = neurons * (inputs + 1);
            let layer = Layer {
                inputs,
                neurons,
                genes: genes[offset..offset + size].to_vec(),
            };
            offset += size;
            layer
        });
        Ok(Self { layers, activation })
    }

    pub fn forward(&self, input: [Fnum; INPUTS]) -> [Fnum; OUTPUTS] {
        let mut a = input.to_vec();
        let mut b = Vec::with_capacity(5);
        for layer in &self.layers {
            layer.forward(&a, self.activation, &mut b);
            std::mem::swap(&mut a, &mut b);
        }
        [a[0], a[1]]
    }
}
