//! Recurrent sparse distributed representation layer.
//!
//! A [`SparseLayer`] holds a visible (input) field and a hidden (code) field.
//! Every hidden node owns three connection lists:
//! - `feed_forward`: visible nodes within the receptive radius
//! - `recurrent`: hidden nodes' previous states within the recurrent radius
//! - `lateral`: competing hidden nodes within the lateral radius (inhibitory)
//!
//! ## Per-step usage
//!
//! ```text
//! set_visible_input(..)
//! activate(..)          // settle to a sparse code
//! learn(..)             // reconstruction-gated Hebbian update
//! step_end()            // state → state_prev
//! ```

use ndarray::{Array1, Array2};
use rand::Rng;
use rayon::prelude::*;
use tracing::trace;

use super::connection::{scatter, weighted_sum, Connection};
use super::grid::{neighborhood, project, GridSize};
use super::{check_len, check_range, SdrError, SdrResult};

/// One element of the input field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisibleNode {
    /// Set by the caller or by the layer below
    pub input: f32,
    /// Overwritten by every reconstruction pass
    pub reconstruction: f32,
}

/// One sparse code unit.
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenNode {
    pub feed_forward: Vec<Connection>,
    pub recurrent: Vec<Connection>,
    pub lateral: Vec<Connection>,

    /// Integrator potential averaged over the measured iterations
    pub activation: f32,
    /// Binary view of `activation` against `threshold`
    pub spike: f32,
    pub spike_prev: f32,
    /// Firing rate over the measured iterations
    pub state: f32,
    pub state_prev: f32,
    /// Excitation used for the last settle
    pub input: f32,
    /// Recurrent reconstruction of this node's previous state
    pub reconstruction: f32,

    pub threshold: f32,
}

impl HiddenNode {
    fn new(threshold: f32) -> Self {
        Self {
            feed_forward: Vec::new(),
            recurrent: Vec::new(),
            lateral: Vec::new(),
            activation: 0.0,
            spike: 0.0,
            spike_prev: 0.0,
            state: 0.0,
            state_prev: 0.0,
            input: 0.0,
            reconstruction: 0.0,
            threshold,
        }
    }
}

/// Field sizes and connection radii for [`SparseLayer::create_random`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseLayerDesc {
    pub visible_size: GridSize,
    pub hidden_size: GridSize,
    pub receptive_radius: i32,
    pub recurrent_radius: i32,
    pub lateral_radius: i32,
}

/// Learning rates and regularisation for [`SparseLayer::learn`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnParams {
    pub feed_forward: f32,
    pub recurrent: f32,
    pub lateral: f32,
    pub threshold: f32,
    /// Target fraction of hidden units spiking per step
    pub sparsity: f32,
    pub weight_decay: f32,
    pub max_weight_delta: f32,
}

impl Default for LearnParams {
    fn default() -> Self {
        Self {
            feed_forward: 0.1,
            recurrent: 0.1,
            lateral: 0.2,
            threshold: 0.05,
            sparsity: 0.05,
            weight_decay: 0.0,
            max_weight_delta: 0.5,
        }
    }
}

/// Averaged outcome of a settle run, one entry per hidden node.
struct Settled {
    activations: Vec<f32>,
    rates: Vec<f32>,
}

/// A visible field and a hidden field joined by feed-forward, recurrent and
/// lateral connections.
#[derive(Debug, Clone)]
pub struct SparseLayer {
    visible_size: GridSize,
    hidden_size: GridSize,
    receptive_radius: i32,
    recurrent_radius: i32,
    lateral_radius: i32,

    visible: Vec<VisibleNode>,
    hidden: Vec<HiddenNode>,
}

impl SparseLayer {
    /// Allocate both fields and draw the fixed topology.
    ///
    /// Feed-forward and recurrent weights are drawn uniformly from
    /// `init_weight_range`, lateral (inhibitory) weights from
    /// `init_inhibition_range`. Every threshold starts at `init_threshold`.
    ///
    /// # Errors
    /// - `InvalidConfig` if a field is empty, a range is inverted, or a radius
    ///   leaves some hidden node with an empty neighbourhood
    pub fn create_random<R: Rng + ?Sized>(
        desc: &SparseLayerDesc,
        init_weight_range: (f32, f32),
        init_inhibition_range: (f32, f32),
        init_threshold: f32,
        rng: &mut R,
    ) -> SdrResult<Self> {
        let visible_size = desc.visible_size;
        let hidden_size = desc.hidden_size;

        if visible_size.is_empty() || hidden_size.is_empty() {
            return Err(SdrError::InvalidConfig(format!(
                "fields must be non-empty (visible {}x{}, hidden {}x{})",
                visible_size.width, visible_size.height, hidden_size.width, hidden_size.height
            )));
        }
        if visible_size.len() > u32::MAX as usize || hidden_size.len() > u32::MAX as usize {
            return Err(SdrError::InvalidConfig(
                "field too large for 32-bit connection indices".to_string(),
            ));
        }
        check_range("init_weight_range", init_weight_range)?;
        check_range("init_inhibition_range", init_inhibition_range)?;
        if !init_threshold.is_finite() {
            return Err(SdrError::InvalidConfig(format!(
                "init_threshold must be finite, got {init_threshold}"
            )));
        }

        let (w_min, w_max) = init_weight_range;
        let (i_min, i_max) = init_inhibition_range;

        let mut hidden = Vec::with_capacity(hidden_size.len());
        for hi in 0..hidden_size.len() {
            let (hx, hy) = hidden_size.position(hi);
            let mut node = HiddenNode::new(init_threshold);

            let visible_center = project(hx, hy, hidden_size, visible_size);
            let field = neighborhood(visible_center, desc.receptive_radius, visible_size);
            if field.is_empty() {
                return Err(SdrError::InvalidConfig(format!(
                    "receptive_radius {} leaves hidden node {hi} without inputs",
                    desc.receptive_radius
                )));
            }
            node.feed_forward = field
                .into_iter()
                .map(|vi| Connection::new(vi, rng.gen_range(w_min..=w_max)))
                .collect();

            let own = (hx as i64, hy as i64);
            let field = neighborhood(own, desc.recurrent_radius, hidden_size);
            if field.is_empty() {
                return Err(SdrError::InvalidConfig(format!(
                    "recurrent_radius {} leaves hidden node {hi} without context",
                    desc.recurrent_radius
                )));
            }
            node.recurrent = field
                .into_iter()
                .map(|hj| Connection::new(hj, rng.gen_range(w_min..=w_max)))
                .collect();

            let field: Vec<usize> = neighborhood(own, desc.lateral_radius, hidden_size)
                .into_iter()
                .filter(|&hj| hj != hi)
                .collect();
            if field.is_empty() {
                return Err(SdrError::InvalidConfig(format!(
                    "lateral_radius {} leaves hidden node {hi} without competitors",
                    desc.lateral_radius
                )));
            }
            node.lateral = field
                .into_iter()
                .map(|hj| Connection::new(hj, rng.gen_range(i_min..=i_max)))
                .collect();

            hidden.push(node);
        }

        Ok(Self {
            visible_size,
            hidden_size,
            receptive_radius: desc.receptive_radius,
            recurrent_radius: desc.recurrent_radius,
            lateral_radius: desc.lateral_radius,
            visible: vec![VisibleNode::default(); visible_size.len()],
            hidden,
        })
    }

    /// Per-node excitation from the visible inputs plus recurrent context:
    /// `Σ w_ff · input + Σ w_rec · state_prev`.
    pub fn feed_forward_excitations(&self) -> Array1<f32> {
        let inputs: Vec<f32> = self.visible.iter().map(|v| v.input).collect();
        let context: Vec<f32> = self.hidden.iter().map(|h| h.state_prev).collect();

        let excitations: Vec<f32> = self
            .hidden
            .par_iter()
            .map(|node| {
                weighted_sum(&node.feed_forward, &inputs) + weighted_sum(&node.recurrent, &context)
            })
            .collect();
        Array1::from(excitations)
    }

    /// Compute feed-forward excitation and settle the hidden field on it.
    pub fn activate<R: Rng + ?Sized>(
        &mut self,
        settle_iterations: usize,
        measure_iterations: usize,
        leak: f32,
        noise: f32,
        rng: &mut R,
    ) -> SdrResult<()> {
        let excitations = self.feed_forward_excitations();
        self.activate_with(
            &excitations,
            settle_iterations,
            measure_iterations,
            leak,
            noise,
            rng,
        )
    }

    /// Settle the hidden field on caller-supplied excitations and store the
    /// result as the layer's current code.
    ///
    /// # Errors
    /// - `ShapeMismatch` if `excitations` is not one value per hidden node
    /// - `InvalidConfig` if `measure_iterations` is zero or `leak` is outside `[0, 1]`
    pub fn activate_with<R: Rng + ?Sized>(
        &mut self,
        excitations: &Array1<f32>,
        settle_iterations: usize,
        measure_iterations: usize,
        leak: f32,
        noise: f32,
        rng: &mut R,
    ) -> SdrResult<()> {
        check_len("excitations", excitations.len(), self.hidden.len())?;
        let excitations = excitations.to_vec();
        let settled = self.settle(
            &excitations,
            settle_iterations,
            measure_iterations,
            leak,
            noise,
            rng,
        )?;

        let mut active = 0usize;
        for (i, node) in self.hidden.iter_mut().enumerate() {
            node.input = excitations[i];
            node.activation = settled.activations[i];
            node.state = settled.rates[i];
            node.spike = if node.activation > node.threshold {
                active += 1;
                1.0
            } else {
                0.0
            };
        }
        trace!(active, total = self.hidden.len(), "hidden field settled");

        Ok(())
    }

    /// Apply lateral competition to `excitations` without touching the
    /// layer's stored code. Writes each node's firing rate into `states`.
    ///
    /// # Errors
    /// Same as [`activate_with`](Self::activate_with), plus `ShapeMismatch` for `states`.
    #[allow(clippy::too_many_arguments)]
    pub fn inhibit<R: Rng + ?Sized>(
        &self,
        excitations: &Array1<f32>,
        settle_iterations: usize,
        measure_iterations: usize,
        leak: f32,
        noise: f32,
        states: &mut Array1<f32>,
        rng: &mut R,
    ) -> SdrResult<()> {
        check_len("excitations", excitations.len(), self.hidden.len())?;
        check_len("states", states.len(), self.hidden.len())?;
        let settled = self.settle(
            &excitations.to_vec(),
            settle_iterations,
            measure_iterations,
            leak,
            noise,
            rng,
        )?;
        for (s, &rate) in states.iter_mut().zip(settled.rates.iter()) {
            *s = rate;
        }
        Ok(())
    }

    /// Leaky-integrator settling under lateral inhibition.
    ///
    /// Iterations are double-buffered: every node reads the spikes of the
    /// previous iteration only.
    fn settle<R: Rng + ?Sized>(
        &self,
        excitations: &[f32],
        settle_iterations: usize,
        measure_iterations: usize,
        leak: f32,
        noise: f32,
        rng: &mut R,
    ) -> SdrResult<Settled> {
        if measure_iterations == 0 {
            return Err(SdrError::InvalidConfig(
                "measure_iterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&leak) {
            return Err(SdrError::InvalidConfig(format!(
                "leak must lie in [0, 1], got {leak}"
            )));
        }

        let n = self.hidden.len();
        let mut potentials = vec![0.0f32; n];
        let mut spikes = vec![0.0f32; n];
        let mut next_potentials = vec![0.0f32; n];
        let mut next_spikes = vec![0.0f32; n];
        let mut jitter = vec![0.0f32; n];
        let mut activations = vec![0.0f32; n];
        let mut rates = vec![0.0f32; n];

        for iter in 0..settle_iterations + measure_iterations {
            // Drawn serially so worker count never changes the result.
            if noise != 0.0 {
                for j in jitter.iter_mut() {
                    *j = noise * rng.gen_range(-1.0f32..1.0);
                }
            }

            next_potentials
                .par_iter_mut()
                .zip(next_spikes.par_iter_mut())
                .enumerate()
                .for_each(|(i, (p, s))| {
                    let node = &self.hidden[i];
                    let inhibition = weighted_sum(&node.lateral, &spikes);
                    let v = potentials[i] * (1.0 - leak)
                        + leak * (excitations[i] - inhibition)
                        + jitter[i];
                    *p = v;
                    *s = if v > node.threshold { 1.0 } else { 0.0 };
                });

            std::mem::swap(&mut potentials, &mut next_potentials);
            std::mem::swap(&mut spikes, &mut next_spikes);

            if iter >= settle_iterations {
                for i in 0..n {
                    activations[i] += potentials[i];
                    rates[i] += spikes[i];
                }
            }
        }

        let inv = 1.0 / measure_iterations as f32;
        for i in 0..n {
            activations[i] *= inv;
            rates[i] *= inv;
        }

        Ok(Settled { activations, rates })
    }

    /// Project hidden spikes back to the visible field (and recurrent
    /// reconstruction of the previous state).
    pub fn reconstruct_from_spikes(&mut self) {
        let spikes: Vec<f32> = self.hidden.iter().map(|h| h.spike).collect();
        self.store_reconstruction(&spikes);
    }

    /// Project hidden states back to the visible field (and recurrent
    /// reconstruction of the previous state).
    pub fn reconstruct_from_states(&mut self) {
        let states: Vec<f32> = self.hidden.iter().map(|h| h.state).collect();
        self.store_reconstruction(&states);
    }

    fn store_reconstruction(&mut self, states: &[f32]) {
        let mut recon_hidden = vec![0.0f32; self.hidden.len()];
        let mut recon_visible = vec![0.0f32; self.visible.len()];
        self.scatter_reconstruction(states, &mut recon_hidden, &mut recon_visible);

        for (node, r) in self.hidden.iter_mut().zip(recon_hidden) {
            node.reconstruction = r;
        }
        for (node, r) in self.visible.iter_mut().zip(recon_visible) {
            node.reconstruction = r;
        }
    }

    fn scatter_reconstruction(
        &self,
        states: &[f32],
        recon_hidden: &mut [f32],
        recon_visible: &mut [f32],
    ) {
        for (node, &s) in self.hidden.iter().zip(states) {
            if s == 0.0 {
                continue;
            }
            scatter(&node.feed_forward, s, recon_visible);
            scatter(&node.recurrent, s, recon_hidden);
        }
    }

    /// Reconstruct both the visible field (through feed-forward weights) and
    /// the previous hidden state (through recurrent weights) from arbitrary
    /// hidden `states`. The layer itself is not modified.
    ///
    /// # Errors
    /// `ShapeMismatch` if any vector does not match its field.
    pub fn reconstruct(
        &self,
        states: &Array1<f32>,
        recon_hidden: &mut Array1<f32>,
        recon_visible: &mut Array1<f32>,
    ) -> SdrResult<()> {
        check_len("states", states.len(), self.hidden.len())?;
        check_len("recon_hidden", recon_hidden.len(), self.hidden.len())?;
        check_len("recon_visible", recon_visible.len(), self.visible.len())?;

        let mut hidden = vec![0.0f32; self.hidden.len()];
        let mut visible = vec![0.0f32; self.visible.len()];
        self.scatter_reconstruction(&states.to_vec(), &mut hidden, &mut visible);

        recon_hidden.assign(&Array1::from(hidden));
        recon_visible.assign(&Array1::from(visible));
        Ok(())
    }

    /// Reconstruct the visible field from arbitrary hidden `states` through
    /// the feed-forward weights only.
    ///
    /// # Errors
    /// `ShapeMismatch` if either vector does not match its field.
    pub fn reconstruct_feed_forward(
        &self,
        states: &Array1<f32>,
        recon: &mut Array1<f32>,
    ) -> SdrResult<()> {
        check_len("states", states.len(), self.hidden.len())?;
        check_len("recon", recon.len(), self.visible.len())?;

        let mut visible = vec![0.0f32; self.visible.len()];
        for (node, &s) in self.hidden.iter().zip(states.iter()) {
            if s == 0.0 {
                continue;
            }
            scatter(&node.feed_forward, s, &mut visible);
        }
        recon.assign(&Array1::from(visible));
        Ok(())
    }

    /// Reconstruction-gated Hebbian update.
    ///
    /// # Algorithm
    ///
    /// After reconstructing from the current spikes:
    /// ```text
    /// Δw_ff  = η_ff  s_i (x_j - x̂_j)
    /// Δw_rec = η_rec s_i (h_prev_j - ĥ_prev_j)
    /// Δw_lat = η_lat (s_i s_j - ρ²)          (kept ≥ 0)
    /// θ_i   += η_θ (s_i - ρ)
    /// ```
    /// Every delta is clipped to `±max_weight_delta`, then weights shrink by
    /// `weight_decay`.
    pub fn learn(&mut self, params: &LearnParams) {
        self.reconstruct_from_spikes();
        let (visible_errors, context_errors, spikes) = self.learning_signals();
        let sparsity_sq = params.sparsity * params.sparsity;

        self.hidden.par_iter_mut().for_each(|node| {
            let spike = node.spike;

            for c in &mut node.feed_forward {
                let delta = params.feed_forward * spike * visible_errors[c.target()];
                c.apply_delta(delta, params.max_weight_delta, params.weight_decay);
            }
            for c in &mut node.recurrent {
                let delta = params.recurrent * spike * context_errors[c.target()];
                c.apply_delta(delta, params.max_weight_delta, params.weight_decay);
            }
            for c in &mut node.lateral {
                let delta = params.lateral * (spike * spikes[c.target()] - sparsity_sq);
                c.apply_delta(delta, params.max_weight_delta, params.weight_decay);
                c.weight = c.weight.max(0.0);
            }

            node.threshold += params.threshold * (spike - params.sparsity);
        });
    }

    /// Reward-modulated variant of [`learn`](Self::learn).
    ///
    /// Each connection keeps an eligibility trace of the Hebbian product and
    /// the weight moves by `η · reward_i · trace`:
    /// ```text
    /// e ← λ e + (1 - λ) product
    /// Δw = η r_i e
    /// ```
    /// Threshold adaptation is not reward-modulated.
    ///
    /// # Errors
    /// `ShapeMismatch` if `rewards` is not one value per hidden node.
    pub fn learn_rewarded(
        &mut self,
        rewards: &Array1<f32>,
        lambda: f32,
        params: &LearnParams,
    ) -> SdrResult<()> {
        check_len("rewards", rewards.len(), self.hidden.len())?;
        self.reconstruct_from_spikes();
        let (visible_errors, context_errors, spikes) = self.learning_signals();
        let rewards = rewards.to_vec();
        let sparsity_sq = params.sparsity * params.sparsity;

        self.hidden
            .par_iter_mut()
            .zip(rewards.par_iter())
            .for_each(|(node, &reward)| {
                let spike = node.spike;

                for c in &mut node.feed_forward {
                    c.update_trace(lambda, spike * visible_errors[c.target()]);
                    let delta = params.feed_forward * reward * c.trace;
                    c.apply_delta(delta, params.max_weight_delta, params.weight_decay);
                }
                for c in &mut node.recurrent {
                    c.update_trace(lambda, spike * context_errors[c.target()]);
                    let delta = params.recurrent * reward * c.trace;
                    c.apply_delta(delta, params.max_weight_delta, params.weight_decay);
                }
                for c in &mut node.lateral {
                    c.update_trace(lambda, spike * spikes[c.target()] - sparsity_sq);
                    let delta = params.lateral * reward * c.trace;
                    c.apply_delta(delta, params.max_weight_delta, params.weight_decay);
                    c.weight = c.weight.max(0.0);
                }

                node.threshold += params.threshold * (spike - params.sparsity);
            });

        Ok(())
    }

    /// Visible reconstruction errors, recurrent reconstruction errors and
    /// current spikes, snapshotted before a parallel learning pass.
    fn learning_signals(&self) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
        let visible_errors = self
            .visible
            .iter()
            .map(|v| v.input - v.reconstruction)
            .collect();
        let context_errors = self
            .hidden
            .iter()
            .map(|h| h.state_prev - h.reconstruction)
            .collect();
        let spikes = self.hidden.iter().map(|h| h.spike).collect();
        (visible_errors, context_errors, spikes)
    }

    /// Roll the current code into history. Call exactly once per step, after
    /// every read of the current state.
    pub fn step_end(&mut self) {
        for node in &mut self.hidden {
            node.state_prev = node.state;
            node.spike_prev = node.spike;
        }
    }

    // ---- Visible field ----

    pub fn set_visible_input(&mut self, index: usize, value: f32) -> SdrResult<()> {
        let len = self.visible.len();
        let node = self.visible.get_mut(index).ok_or(SdrError::OutOfBounds {
            what: "visible",
            index,
            len,
        })?;
        node.input = value;
        Ok(())
    }

    pub fn set_visible_input_xy(&mut self, x: usize, y: usize, value: f32) -> SdrResult<()> {
        let index = self.visible_size.index(x, y, "visible")?;
        self.set_visible_input(index, value)
    }

    /// Overwrite the whole visible input field.
    ///
    /// # Errors
    /// `ShapeMismatch` if `inputs` is not one value per visible node.
    pub fn set_visible_inputs(&mut self, inputs: &Array1<f32>) -> SdrResult<()> {
        check_len("visible inputs", inputs.len(), self.visible.len())?;
        for (node, &v) in self.visible.iter_mut().zip(inputs.iter()) {
            node.input = v;
        }
        Ok(())
    }

    pub fn visible_input(&self, index: usize) -> SdrResult<f32> {
        self.visible_node(index).map(|v| v.input)
    }

    pub fn visible_input_xy(&self, x: usize, y: usize) -> SdrResult<f32> {
        self.visible_input(self.visible_size.index(x, y, "visible")?)
    }

    pub fn visible_recon(&self, index: usize) -> SdrResult<f32> {
        self.visible_node(index).map(|v| v.reconstruction)
    }

    pub fn visible_recon_xy(&self, x: usize, y: usize) -> SdrResult<f32> {
        self.visible_recon(self.visible_size.index(x, y, "visible")?)
    }

    pub fn visible_node(&self, index: usize) -> SdrResult<&VisibleNode> {
        self.visible.get(index).ok_or(SdrError::OutOfBounds {
            what: "visible",
            index,
            len: self.visible.len(),
        })
    }

    pub fn visible_nodes(&self) -> &[VisibleNode] {
        &self.visible
    }

    // ---- Hidden field ----

    pub fn hidden_state(&self, index: usize) -> SdrResult<f32> {
        self.hidden_node(index).map(|h| h.state)
    }

    pub fn hidden_state_xy(&self, x: usize, y: usize) -> SdrResult<f32> {
        self.hidden_state(self.hidden_size.index(x, y, "hidden")?)
    }

    pub fn hidden_state_prev(&self, index: usize) -> SdrResult<f32> {
        self.hidden_node(index).map(|h| h.state_prev)
    }

    pub fn hidden_state_prev_xy(&self, x: usize, y: usize) -> SdrResult<f32> {
        self.hidden_state_prev(self.hidden_size.index(x, y, "hidden")?)
    }

    pub fn hidden_node(&self, index: usize) -> SdrResult<&HiddenNode> {
        self.hidden.get(index).ok_or(SdrError::OutOfBounds {
            what: "hidden",
            index,
            len: self.hidden.len(),
        })
    }

    pub fn hidden_node_xy(&self, x: usize, y: usize) -> SdrResult<&HiddenNode> {
        self.hidden_node(self.hidden_size.index(x, y, "hidden")?)
    }

    /// Mutable access for inspection tools and hand-built fixtures.
    /// Connection lists may be reweighted but must not be resized.
    pub fn hidden_node_mut(&mut self, index: usize) -> SdrResult<&mut HiddenNode> {
        let len = self.hidden.len();
        self.hidden.get_mut(index).ok_or(SdrError::OutOfBounds {
            what: "hidden",
            index,
            len,
        })
    }

    pub fn hidden_nodes(&self) -> &[HiddenNode] {
        &self.hidden
    }

    /// Current firing rates of the hidden field.
    pub fn hidden_states(&self) -> Array1<f32> {
        self.hidden.iter().map(|h| h.state).collect()
    }

    /// Current spikes of the hidden field.
    pub fn hidden_spikes(&self) -> Array1<f32> {
        self.hidden.iter().map(|h| h.spike).collect()
    }

    /// Feed-forward weight `ci` of hidden node `hi`.
    pub fn vh_weight(&self, hi: usize, ci: usize) -> SdrResult<f32> {
        let node = self.hidden_node(hi)?;
        node.feed_forward
            .get(ci)
            .map(|c| c.weight)
            .ok_or(SdrError::OutOfBounds {
                what: "feed-forward connection",
                index: ci,
                len: node.feed_forward.len(),
            })
    }

    /// Receptive field of hidden node `(hx, hy)` as a `(2r+1) x (2r+1)`
    /// rectangle indexed `[dy, dx]`; positions clipped by the field edge stay 0.
    pub fn vh_weights(&self, hx: usize, hy: usize) -> SdrResult<Array2<f32>> {
        let node = self.hidden_node_xy(hx, hy)?;
        let r = i64::from(self.receptive_radius);
        let diam = (2 * r + 1) as usize;
        let (cx, cy) = project(hx, hy, self.hidden_size, self.visible_size);

        let mut rect = Array2::zeros((diam, diam));
        for c in &node.feed_forward {
            let (vx, vy) = self.visible_size.position(c.target());
            let dx = (vx as i64 - cx + r) as usize;
            let dy = (vy as i64 - cy + r) as usize;
            rect[[dy, dx]] = c.weight;
        }
        Ok(rect)
    }

    pub fn num_visible(&self) -> usize {
        self.visible.len()
    }

    pub fn num_hidden(&self) -> usize {
        self.hidden.len()
    }

    pub fn visible_size(&self) -> GridSize {
        self.visible_size
    }

    pub fn hidden_size(&self) -> GridSize {
        self.hidden_size
    }

    pub fn receptive_radius(&self) -> i32 {
        self.receptive_radius
    }

    pub fn recurrent_radius(&self) -> i32 {
        self.recurrent_radius
    }

    pub fn lateral_radius(&self) -> i32 {
        self.lateral_radius
    }
}
