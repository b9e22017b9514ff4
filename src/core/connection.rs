//! Weighted edges and their update rules.
//!
//! A [`Connection`] is owned by exactly one node and points at a flat index in
//! some other field (visible, hidden, or the layer above). Topology is fixed at
//! creation; learning only touches `weight` and `trace`.

/// A directed weighted edge to `index` in another field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Connection {
    /// Flat index of the source node in the field this connection reads from
    pub index: u32,
    /// Synaptic weight
    pub weight: f32,
    /// Eligibility trace for reward-modulated learning
    pub trace: f32,
}

impl Connection {
    pub fn new(index: usize, weight: f32) -> Self {
        Self {
            index: index as u32,
            weight,
            trace: 0.0,
        }
    }

    /// Flat index of the node this connection reads from.
    #[inline]
    pub fn target(&self) -> usize {
        self.index as usize
    }

    /// Add a clipped delta, then shrink by `weight_decay`.
    ///
    /// ```text
    /// w ← (w + clip(Δ, ±max_delta)) (1 - decay)
    /// ```
    #[inline]
    pub fn apply_delta(&mut self, delta: f32, max_delta: f32, weight_decay: f32) {
        self.weight += clip_delta(delta, max_delta);
        self.weight -= weight_decay * self.weight;
    }

    /// Decay the eligibility trace and fold in the latest activity product.
    ///
    /// ```text
    /// e ← λ e + (1 - λ) product
    /// ```
    #[inline]
    pub fn update_trace(&mut self, lambda: f32, product: f32) {
        self.trace = lambda * self.trace + (1.0 - lambda) * product;
    }
}

/// Clip a weight delta into `[-max_delta, max_delta]`.
#[inline]
pub fn clip_delta(delta: f32, max_delta: f32) -> f32 {
    delta.clamp(-max_delta, max_delta)
}

/// Weighted sum of `values` gathered through `connections`.
#[inline]
pub fn weighted_sum(connections: &[Connection], values: &[f32]) -> f32 {
    connections
        .iter()
        .map(|c| c.weight * values[c.target()])
        .sum()
}

/// Scatter `value` back through `connections` into `out` (transpose product).
#[inline]
pub fn scatter(connections: &[Connection], value: f32, out: &mut [f32]) {
    for c in connections {
        out[c.target()] += c.weight * value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_delta() {
        assert_eq!(clip_delta(0.2, 0.5), 0.2);
        assert_eq!(clip_delta(2.0, 0.5), 0.5);
        assert_eq!(clip_delta(-3.0, 0.5), -0.5);
    }

    #[test]
    fn test_apply_delta_with_decay() {
        let mut c = Connection::new(3, 1.0);
        c.apply_delta(10.0, 0.5, 0.1);
        // (1.0 + 0.5) * 0.9
        assert!((c.weight - 1.35).abs() < 1e-6);
        assert_eq!(c.target(), 3);
    }

    #[test]
    fn test_update_trace() {
        let mut c = Connection::new(0, 0.0);
        c.update_trace(0.5, 1.0);
        assert!((c.trace - 0.5).abs() < 1e-6);
        c.update_trace(0.5, 0.0);
        assert!((c.trace - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_sum_and_scatter() {
        let conns = vec![Connection::new(0, 0.5), Connection::new(2, -1.0)];
        let values = [2.0, 100.0, 1.0];
        assert!((weighted_sum(&conns, &values) - 0.0).abs() < 1e-6);

        let mut out = [0.0; 3];
        scatter(&conns, 2.0, &mut out);
        assert_eq!(out, [1.0, 0.0, -2.0]);
    }
}
