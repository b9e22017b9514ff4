//! Hierarchical predictive stack of sparse layers.
//!
//! Each [`Layer`] pairs a [`SparseLayer`] with one [`PredictionNode`] per
//! hidden unit. Prediction nodes read the layer above (feedback) and their own
//! layer (predictive) and forecast the next hidden code; the bottom layer's
//! forecast is decoded into a prediction over the input field.
//!
//! ## Step structure
//!
//! ```text
//! bottom → top:  visible input = external input | hidden state of layer below
//!                excitation    = feed-forward + recurrent
//!                                + attention · surprise_i · predicted_i
//!                settle under lateral inhibition
//! surprise:      s̄_i ← (1 - d) s̄_i + d |predicted_i - actual_i|
//! learning:      sparse layers + prediction nodes (delta rule on the forecast)
//! top → bottom:  predicted_i = σ(Σ w_fb h_above + Σ w_pred h_own + b)
//! decode:        prediction  = feed-forward transpose of bottom forecast
//! step end:      state → state_prev in every layer
//! ```

use ndarray::Array1;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::connection::{weighted_sum, Connection};
use super::grid::{neighborhood, project, GridSize};
use super::sparse_layer::{LearnParams, SparseLayer, SparseLayerDesc};
use super::{check_range, SdrError, SdrResult};
use crate::utils::sigmoid;
use crate::Config;

/// Shape, connectivity and learning rates of one stack layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerDesc {
    /// Hidden field width
    pub width: usize,
    /// Hidden field height
    pub height: usize,

    pub receptive_radius: i32,
    pub recurrent_radius: i32,
    pub lateral_radius: i32,
    pub predictive_radius: i32,
    pub feed_back_radius: i32,

    pub learn_feed_forward: f32,
    pub learn_recurrent: f32,
    pub learn_lateral: f32,
    pub learn_threshold: f32,

    pub learn_feed_back: f32,
    pub learn_prediction: f32,

    /// Rate of the exponential running average of prediction error
    pub average_surprise_decay: f32,
    /// Gain of the top-down forecast in the excitation blend
    pub attention_factor: f32,

    /// Target fraction of spiking hidden units
    pub sparsity: f32,
    pub init_threshold: f32,
}

impl Default for LayerDesc {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            receptive_radius: 8,
            recurrent_radius: 6,
            lateral_radius: 5,
            predictive_radius: 6,
            feed_back_radius: 8,
            learn_feed_forward: 0.1,
            learn_recurrent: 0.1,
            learn_lateral: 0.2,
            learn_threshold: 0.05,
            learn_feed_back: 0.01,
            learn_prediction: 0.01,
            average_surprise_decay: 0.01,
            attention_factor: 2.0,
            sparsity: 0.05,
            init_threshold: 0.0,
        }
    }
}

impl LayerDesc {
    fn validate(&self, index: usize) -> SdrResult<()> {
        let fail = |msg: String| Err(SdrError::InvalidConfig(format!("layer {index}: {msg}")));

        if self.width == 0 || self.height == 0 {
            return fail(format!("hidden field {}x{} is empty", self.width, self.height));
        }
        for (name, r) in [
            ("receptive_radius", self.receptive_radius),
            ("recurrent_radius", self.recurrent_radius),
            ("lateral_radius", self.lateral_radius),
            ("predictive_radius", self.predictive_radius),
            ("feed_back_radius", self.feed_back_radius),
        ] {
            if r <= 0 {
                return fail(format!("{name} must be positive, got {r}"));
            }
        }
        if !(self.sparsity > 0.0 && self.sparsity <= 1.0) {
            return fail(format!("sparsity must lie in (0, 1], got {}", self.sparsity));
        }
        if !(0.0..=1.0).contains(&self.average_surprise_decay) {
            return fail(format!(
                "average_surprise_decay must lie in [0, 1], got {}",
                self.average_surprise_decay
            ));
        }
        Ok(())
    }

    fn learn_params(&self, config: &Config) -> LearnParams {
        LearnParams {
            feed_forward: self.learn_feed_forward,
            recurrent: self.learn_recurrent,
            lateral: self.learn_lateral,
            threshold: self.learn_threshold,
            sparsity: self.sparsity,
            weight_decay: config.weight_decay,
            max_weight_delta: config.max_weight_delta,
        }
    }
}

/// Top-down forecast for one hidden unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionNode {
    /// From the layer above's hidden field (empty on the top layer)
    pub feed_back: Vec<Connection>,
    /// From this layer's own hidden field
    pub predictive: Vec<Connection>,
    pub bias: Connection,

    /// Forecast of this unit's next state
    pub state: f32,
    /// Forecast that was in force during the current step
    pub state_prev: f32,

    /// Running average of `|forecast - actual|`
    pub average_surprise: f32,
}

/// A sparse layer with an optional prediction-node set.
#[derive(Debug, Clone)]
pub struct Layer {
    pub sdr: SparseLayer,
    pub prediction_nodes: Option<Vec<PredictionNode>>,
}

impl Layer {
    pub fn is_predictive(&self) -> bool {
        self.prediction_nodes.is_some()
    }

    /// Current forecast per hidden unit, or the actual code for plain layers.
    pub fn forecast(&self) -> Array1<f32> {
        match &self.prediction_nodes {
            Some(nodes) => nodes.iter().map(|p| p.state).collect(),
            None => self.sdr.hidden_states(),
        }
    }
}

/// Ordered stack of predictive layers over a 2-D input field.
#[derive(Debug, Clone)]
pub struct PredictiveStack {
    layer_descs: Vec<LayerDesc>,
    layers: Vec<Layer>,
    config: Config,
    prediction: Array1<f32>,
    steps: u64,
}

impl PredictiveStack {
    /// Build every layer bottom-up: layer `l` sees layer `l-1`'s hidden field
    /// (the external input for `l = 0`), and its prediction nodes reach into
    /// layer `l+1` within `feed_back_radius`.
    ///
    /// # Errors
    /// - `InvalidConfig` if `layer_descs` is empty, any descriptor is
    ///   malformed, or a weight range is inverted
    pub fn create_random<R: Rng + ?Sized>(
        input_size: GridSize,
        layer_descs: Vec<LayerDesc>,
        init_weight_range: (f32, f32),
        init_inhibition_range: (f32, f32),
        rng: &mut R,
    ) -> SdrResult<Self> {
        if layer_descs.is_empty() {
            return Err(SdrError::InvalidConfig(
                "stack needs at least one layer".to_string(),
            ));
        }
        if input_size.is_empty() {
            return Err(SdrError::InvalidConfig(format!(
                "input field {}x{} is empty",
                input_size.width, input_size.height
            )));
        }
        check_range("init_weight_range", init_weight_range)?;
        check_range("init_inhibition_range", init_inhibition_range)?;
        for (l, desc) in layer_descs.iter().enumerate() {
            desc.validate(l)?;
        }

        let (w_min, w_max) = init_weight_range;
        let mut layers = Vec::with_capacity(layer_descs.len());
        let mut visible_size = input_size;

        for (l, desc) in layer_descs.iter().enumerate() {
            let hidden_size = GridSize::new(desc.width, desc.height);
            let sdr = SparseLayer::create_random(
                &SparseLayerDesc {
                    visible_size,
                    hidden_size,
                    receptive_radius: desc.receptive_radius,
                    recurrent_radius: desc.recurrent_radius,
                    lateral_radius: desc.lateral_radius,
                },
                init_weight_range,
                init_inhibition_range,
                desc.init_threshold,
                rng,
            )?;

            let above = layer_descs
                .get(l + 1)
                .map(|next| GridSize::new(next.width, next.height));

            let mut nodes = Vec::with_capacity(hidden_size.len());
            for hi in 0..hidden_size.len() {
                let (hx, hy) = hidden_size.position(hi);

                let feed_back = match above {
                    Some(above_size) => {
                        let center = project(hx, hy, hidden_size, above_size);
                        neighborhood(center, desc.feed_back_radius, above_size)
                            .into_iter()
                            .map(|ai| Connection::new(ai, rng.gen_range(w_min..=w_max)))
                            .collect()
                    }
                    None => Vec::new(),
                };

                let predictive = neighborhood(
                    (hx as i64, hy as i64),
                    desc.predictive_radius,
                    hidden_size,
                )
                .into_iter()
                .map(|hj| Connection::new(hj, rng.gen_range(w_min..=w_max)))
                .collect();

                nodes.push(PredictionNode {
                    feed_back,
                    predictive,
                    bias: Connection::new(hi, rng.gen_range(w_min..=w_max)),
                    state: 0.0,
                    state_prev: 0.0,
                    average_surprise: 0.0,
                });
            }

            info!(
                layer = l,
                visible = visible_size.len(),
                hidden = hidden_size.len(),
                feed_forward = sdr.hidden_nodes().iter().map(|h| h.feed_forward.len()).sum::<usize>(),
                "created predictive layer"
            );

            layers.push(Layer {
                sdr,
                prediction_nodes: Some(nodes),
            });
            visible_size = hidden_size;
        }

        Ok(Self {
            layer_descs,
            layers,
            config: Config::default(),
            prediction: Array1::zeros(input_size.len()),
            steps: 0,
        })
    }

    /// Replace the per-step simulation parameters.
    ///
    /// # Errors
    /// `InvalidConfig` if the parameters are out of range.
    pub fn with_config(mut self, config: Config) -> SdrResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Advance the simulation by one discrete step.
    ///
    /// After this call, [`prediction`](Self::prediction) holds the forecast
    /// of the next input.
    pub fn sim_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SdrResult<()> {
        self.activate_bottom_up(rng)?;
        self.update_surprise();
        self.learn();
        self.predict_top_down();

        let forecast = self.layers[0].forecast();
        self.layers[0]
            .sdr
            .reconstruct_feed_forward(&forecast, &mut self.prediction)?;

        for layer in &mut self.layers {
            layer.sdr.step_end();
        }
        self.steps += 1;

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                step = self.steps,
                surprise = self.mean_surprise(),
                active = self.layers[0].sdr.hidden_spikes().mean().unwrap_or(0.0),
                "sim step"
            );
        }
        Ok(())
    }

    /// Settle every layer on its input blended with the forecast made last step.
    fn activate_bottom_up<R: Rng + ?Sized>(&mut self, rng: &mut R) -> SdrResult<()> {
        let cfg = self.config;

        for l in 0..self.layers.len() {
            if l > 0 {
                let below = self.layers[l - 1].sdr.hidden_states();
                self.layers[l].sdr.set_visible_inputs(&below)?;
            }

            let desc = &self.layer_descs[l];
            let layer = &mut self.layers[l];
            let mut excitations = layer.sdr.feed_forward_excitations();
            if let Some(nodes) = &layer.prediction_nodes {
                for (e, node) in excitations.iter_mut().zip(nodes) {
                    *e += desc.attention_factor * node.average_surprise * node.state;
                }
            }

            layer.sdr.activate_with(
                &excitations,
                cfg.settle_iterations,
                cfg.measure_iterations,
                cfg.leak,
                cfg.noise,
                rng,
            )?;
        }
        Ok(())
    }

    fn update_surprise(&mut self) {
        for (layer, desc) in self.layers.iter_mut().zip(&self.layer_descs) {
            let Some(nodes) = layer.prediction_nodes.as_mut() else {
                continue;
            };
            let decay = desc.average_surprise_decay;
            for (node, hidden) in nodes.iter_mut().zip(layer.sdr.hidden_nodes()) {
                let surprise = (node.state - hidden.state).abs();
                node.average_surprise = (1.0 - decay) * node.average_surprise + decay * surprise;
            }
        }
    }

    /// Sparse-layer learning plus a delta rule on every forecast, using the
    /// codes the forecast was formed from (`state_prev`).
    fn learn(&mut self) {
        let max_delta = self.config.max_weight_delta;
        let prev_codes: Vec<Vec<f32>> = self
            .layers
            .iter()
            .map(|layer| layer.sdr.hidden_nodes().iter().map(|h| h.state_prev).collect())
            .collect();

        for l in 0..self.layers.len() {
            let desc = &self.layer_descs[l];
            let params = desc.learn_params(&self.config);
            let layer = &mut self.layers[l];
            layer.sdr.learn(&params);

            let Some(nodes) = layer.prediction_nodes.as_mut() else {
                continue;
            };
            let actual: Vec<f32> = layer.sdr.hidden_nodes().iter().map(|h| h.state).collect();
            let own_prev = &prev_codes[l];
            let above_prev = prev_codes.get(l + 1);
            let (learn_fb, learn_pred) = (desc.learn_feed_back, desc.learn_prediction);

            nodes
                .par_iter_mut()
                .zip(actual.par_iter())
                .for_each(|(node, &target)| {
                    let error = target - node.state;
                    if let Some(above) = above_prev {
                        for c in &mut node.feed_back {
                            c.apply_delta(learn_fb * error * above[c.target()], max_delta, 0.0);
                        }
                    }
                    for c in &mut node.predictive {
                        c.apply_delta(learn_pred * error * own_prev[c.target()], max_delta, 0.0);
                    }
                    node.bias.apply_delta(learn_pred * error, max_delta, 0.0);
                });
        }
    }

    /// Forecast each layer's next code from the codes just settled.
    fn predict_top_down(&mut self) {
        let codes: Vec<Vec<f32>> = self
            .layers
            .iter()
            .map(|layer| layer.sdr.hidden_nodes().iter().map(|h| h.state).collect())
            .collect();

        for l in (0..self.layers.len()).rev() {
            let own = &codes[l];
            let above = codes.get(l + 1);
            let Some(nodes) = self.layers[l].prediction_nodes.as_mut() else {
                continue;
            };

            nodes.par_iter_mut().for_each(|node| {
                let mut drive = weighted_sum(&node.predictive, own) + node.bias.weight;
                if let Some(above) = above {
                    drive += weighted_sum(&node.feed_back, above);
                }
                node.state_prev = node.state;
                node.state = sigmoid(drive);
            });
        }
    }

    /// Mean running surprise over every prediction node in the stack.
    pub fn mean_surprise(&self) -> f32 {
        let (sum, count) = self
            .layers
            .iter()
            .filter_map(|layer| layer.prediction_nodes.as_ref())
            .flatten()
            .fold((0.0f32, 0usize), |(s, n), node| (s + node.average_surprise, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Write one element of the bottom layer's input field.
    ///
    /// # Errors
    /// `OutOfBounds` if `index` lies outside the input field.
    pub fn set_input(&mut self, index: usize, value: f32) -> SdrResult<()> {
        self.layers[0].sdr.set_visible_input(index, value)
    }

    pub fn set_input_xy(&mut self, x: usize, y: usize, value: f32) -> SdrResult<()> {
        self.layers[0].sdr.set_visible_input_xy(x, y, value)
    }

    /// Most recently decoded forecast for input element `index`.
    /// All zeros until the first [`sim_step`](Self::sim_step).
    ///
    /// # Errors
    /// `OutOfBounds` if `index` lies outside the input field.
    pub fn get_prediction(&self, index: usize) -> SdrResult<f32> {
        self.prediction
            .get(index)
            .copied()
            .ok_or(SdrError::OutOfBounds {
                what: "prediction",
                index,
                len: self.prediction.len(),
            })
    }

    pub fn get_prediction_xy(&self, x: usize, y: usize) -> SdrResult<f32> {
        let index = self.input_size().index(x, y, "prediction")?;
        self.get_prediction(index)
    }

    pub fn prediction(&self) -> &Array1<f32> {
        &self.prediction
    }

    pub fn layer_descs(&self) -> &[LayerDesc] {
        &self.layer_descs
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn input_size(&self) -> GridSize {
        self.layers[0].sdr.visible_size()
    }

    pub fn input_width(&self) -> usize {
        self.input_size().width
    }

    pub fn input_height(&self) -> usize {
        self.input_size().height
    }

    /// Number of completed simulation steps.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}
