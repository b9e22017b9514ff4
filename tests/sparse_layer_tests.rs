//! Integration tests for a single sparse layer.
//!
//! These tests verify:
//! - Connection topology and initial weight ranges
//! - Settling and reconstruction on a hand-built layer
//! - History roll-over at step end
//! - Threshold adaptation drives the firing rate to the target sparsity
//! - Reward-modulated learning through eligibility traces

use approx::assert_abs_diff_eq;
use ndarray::Array1;
use predictive_sdr::{GridSize, LearnParams, SdrError, SparseLayer, SparseLayerDesc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// 2x2 visible, 2x2 hidden, each hidden node reading exactly the visible
/// node at its own position with weight `ff_weight`. Recurrent and lateral
/// weights are zeroed.
fn identity_layer(ff_weight: f32, threshold: f32) -> SparseLayer {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let mut layer = SparseLayer::create_random(
        &SparseLayerDesc {
            visible_size: GridSize::new(2, 2),
            hidden_size: GridSize::new(2, 2),
            receptive_radius: 0,
            recurrent_radius: 0,
            lateral_radius: 1,
        },
        (-0.1, 0.1),
        (0.0, 0.1),
        threshold,
        &mut rng,
    )
    .expect("valid layer");

    for hi in 0..4 {
        let node = layer.hidden_node_mut(hi).expect("hidden index");
        assert_eq!(node.feed_forward.len(), 1);
        assert_eq!(node.feed_forward[0].target(), hi);
        node.feed_forward[0].weight = ff_weight;
        node.recurrent.iter_mut().for_each(|c| c.weight = 0.0);
        node.lateral.iter_mut().for_each(|c| c.weight = 0.0);
    }
    layer
}

fn one_hot(len: usize, index: usize) -> Array1<f32> {
    let mut v = Array1::zeros(len);
    v[index] = 1.0;
    v
}

#[test]
fn test_topology_counts() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let layer = SparseLayer::create_random(
        &SparseLayerDesc {
            visible_size: GridSize::new(5, 5),
            hidden_size: GridSize::new(5, 5),
            receptive_radius: 1,
            recurrent_radius: 1,
            lateral_radius: 1,
        },
        (-0.2, 0.3),
        (0.0, 0.05),
        0.0,
        &mut rng,
    )
    .expect("valid layer");

    // corner, edge, interior
    for ((x, y), expected) in [((0, 0), 4), ((2, 0), 6), ((2, 2), 9), ((4, 4), 4)] {
        let node = layer.hidden_node_xy(x, y).unwrap();
        assert_eq!(node.feed_forward.len(), expected, "ff at ({x}, {y})");
        assert_eq!(node.recurrent.len(), expected, "rec at ({x}, {y})");
        assert_eq!(node.lateral.len(), expected - 1, "lat at ({x}, {y})");
    }

    for (hi, node) in layer.hidden_nodes().iter().enumerate() {
        assert!(node.lateral.iter().all(|c| c.target() != hi));
        for c in node.feed_forward.iter().chain(&node.recurrent) {
            assert!((-0.2..=0.3).contains(&c.weight));
        }
        for c in &node.lateral {
            assert!((0.0..=0.05).contains(&c.weight));
        }
    }
}

#[test]
fn test_topology_counts_downscaled() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let layer = SparseLayer::create_random(
        &SparseLayerDesc {
            visible_size: GridSize::new(8, 8),
            hidden_size: GridSize::new(4, 4),
            receptive_radius: 1,
            recurrent_radius: 1,
            lateral_radius: 1,
        },
        (-0.2, 0.3),
        (0.0, 0.05),
        0.0,
        &mut rng,
    )
    .expect("valid layer");

    // Hidden x projects to visible 2x + 1, so the last column's window
    // [6, 8] is clipped to [6, 7] while the first column's [0, 2] is not.
    for ((x, y), ff, rec) in [
        ((0, 0), 9, 4),
        ((1, 1), 9, 9),
        ((2, 0), 9, 6),
        ((3, 0), 6, 4),
        ((0, 3), 6, 4),
        ((3, 3), 4, 4),
    ] {
        let node = layer.hidden_node_xy(x, y).unwrap();
        assert_eq!(node.feed_forward.len(), ff, "ff at ({x}, {y})");
        assert_eq!(node.recurrent.len(), rec, "rec at ({x}, {y})");
        assert_eq!(node.lateral.len(), rec - 1, "lat at ({x}, {y})");
        for c in node.feed_forward.iter().chain(&node.recurrent) {
            assert!((-0.2..=0.3).contains(&c.weight));
        }
    }

    let corner: Vec<usize> = layer
        .hidden_node_xy(3, 3)
        .unwrap()
        .feed_forward
        .iter()
        .map(|c| c.target())
        .collect();
    assert_eq!(corner, vec![54, 55, 62, 63]);
}

#[test]
fn test_projection_between_field_sizes() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let layer = SparseLayer::create_random(
        &SparseLayerDesc {
            visible_size: GridSize::new(8, 8),
            hidden_size: GridSize::new(4, 4),
            receptive_radius: 0,
            recurrent_radius: 1,
            lateral_radius: 1,
        },
        (-0.1, 0.1),
        (0.0, 0.1),
        0.0,
        &mut rng,
    )
    .expect("valid layer");

    // Hidden (1, 2) projects to visible ((1.5 * 2), (2.5 * 2)) = (3, 5)
    let node = layer.hidden_node_xy(1, 2).unwrap();
    assert_eq!(node.feed_forward.len(), 1);
    assert_eq!(node.feed_forward[0].target(), 5 * 8 + 3);
}

#[test]
fn test_invalid_layers_rejected() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let desc = SparseLayerDesc {
        visible_size: GridSize::new(2, 2),
        hidden_size: GridSize::new(2, 2),
        receptive_radius: 1,
        recurrent_radius: 1,
        lateral_radius: 1,
    };

    let result = SparseLayer::create_random(&desc, (0.1, -0.1), (0.0, 0.1), 0.0, &mut rng);
    assert!(matches!(result, Err(SdrError::InvalidConfig(_))));

    let no_competitors = SparseLayerDesc {
        lateral_radius: 0,
        ..desc
    };
    let result = SparseLayer::create_random(&no_competitors, (-0.1, 0.1), (0.0, 0.1), 0.0, &mut rng);
    assert!(matches!(result, Err(SdrError::InvalidConfig(_))));

    let empty = SparseLayerDesc {
        hidden_size: GridSize::new(0, 3),
        ..desc
    };
    assert!(SparseLayer::create_random(&empty, (-0.1, 0.1), (0.0, 0.1), 0.0, &mut rng).is_err());
}

#[test]
fn test_settle_and_reconstruct() {
    let mut layer = identity_layer(1.0, 0.5);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    layer.set_visible_inputs(&one_hot(4, 2)).unwrap();
    layer.activate(20, 4, 0.25, 0.0, &mut rng).unwrap();

    let states = layer.hidden_states();
    assert_abs_diff_eq!(states[2], 1.0, epsilon = 1e-6);
    for i in [0, 1, 3] {
        assert_abs_diff_eq!(states[i], 0.0, epsilon = 1e-6);
    }
    assert_eq!(layer.hidden_spikes(), one_hot(4, 2));
    // Potential approaches the excitation under a constant drive
    assert!(layer.hidden_node(2).unwrap().activation > 0.99);

    layer.reconstruct_from_states();
    assert_abs_diff_eq!(layer.visible_recon(2).unwrap(), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(layer.visible_recon_xy(1, 0).unwrap(), 0.0, epsilon = 1e-6);

    let mut recon_hidden = Array1::zeros(4);
    let mut recon_visible = Array1::zeros(4);
    layer
        .reconstruct(&one_hot(4, 3), &mut recon_hidden, &mut recon_visible)
        .unwrap();
    assert_eq!(recon_visible, one_hot(4, 3));
    assert_eq!(recon_hidden, Array1::<f32>::zeros(4));

    // Stale contents are overwritten, not accumulated
    let mut recon = Array1::from_elem(4, 5.0);
    layer.reconstruct_feed_forward(&states, &mut recon).unwrap();
    assert_eq!(recon, one_hot(4, 2));

    let mut wrong = Array1::zeros(3);
    assert!(matches!(
        layer.reconstruct_feed_forward(&states, &mut wrong),
        Err(SdrError::ShapeMismatch(_))
    ));
}

#[test]
fn test_inhibit_leaves_layer_untouched() {
    let layer = identity_layer(1.0, 0.5);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let excitations = Array1::from(vec![0.0, 1.0, 0.0, 0.0]);
    let mut states = Array1::zeros(4);
    layer
        .inhibit(&excitations, 20, 4, 0.25, 0.0, &mut states, &mut rng)
        .unwrap();
    assert_eq!(states, one_hot(4, 1));
    assert!(layer.hidden_nodes().iter().all(|h| h.state == 0.0));
}

#[test]
fn test_settle_parameters_validated() {
    let mut layer = identity_layer(1.0, 0.5);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    assert!(layer.activate(20, 0, 0.25, 0.0, &mut rng).is_err());
    assert!(layer.activate(20, 4, 1.5, 0.0, &mut rng).is_err());
    let short = Array1::zeros(3);
    assert!(layer
        .activate_with(&short, 20, 4, 0.25, 0.0, &mut rng)
        .is_err());
}

#[test]
fn test_step_end_rolls_state() {
    let mut layer = identity_layer(1.0, 0.5);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    layer.set_visible_input_xy(0, 1, 1.0).unwrap();
    layer.activate(20, 4, 0.25, 0.0, &mut rng).unwrap();

    assert_abs_diff_eq!(layer.hidden_state(2).unwrap(), 1.0, epsilon = 1e-6);
    assert_eq!(layer.hidden_state_prev(2).unwrap(), 0.0);

    layer.step_end();
    for h in layer.hidden_nodes() {
        assert_eq!(h.state, h.state_prev);
        assert_eq!(h.spike, h.spike_prev);
    }

    layer.step_end();
    assert_abs_diff_eq!(layer.hidden_state_prev_xy(0, 1).unwrap(), 1.0, epsilon = 1e-6);
}

#[test]
fn test_perfect_reconstruction_leaves_weights() {
    let mut layer = identity_layer(1.0, 0.5);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    layer.set_visible_inputs(&one_hot(4, 2)).unwrap();
    layer.activate(20, 4, 0.25, 0.0, &mut rng).unwrap();

    let params = LearnParams::default();
    layer.learn(&params);

    for hi in 0..4 {
        assert_eq!(layer.vh_weight(hi, 0).unwrap(), 1.0);
        // Lateral deltas are negative here and clamp at zero
        assert!(layer.hidden_node(hi).unwrap().lateral.iter().all(|c| c.weight == 0.0));
    }
    // Spiking node's threshold rises, silent ones fall
    assert_abs_diff_eq!(
        layer.hidden_node(2).unwrap().threshold,
        0.5 + params.threshold * (1.0 - params.sparsity),
        epsilon = 1e-6
    );
    assert_abs_diff_eq!(
        layer.hidden_node(0).unwrap().threshold,
        0.5 - params.threshold * params.sparsity,
        epsilon = 1e-6
    );
}

#[test]
fn test_reconstruction_error_grows_weight() {
    let mut layer = identity_layer(0.5, 0.3);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    layer.set_visible_inputs(&one_hot(4, 2)).unwrap();
    layer.activate(20, 4, 0.25, 0.0, &mut rng).unwrap();
    assert_eq!(layer.hidden_spikes(), one_hot(4, 2));

    let params = LearnParams {
        feed_forward: 0.1,
        ..LearnParams::default()
    };
    layer.learn(&params);
    // Δ = 0.1 * 1 * (1.0 - 0.5)
    assert_abs_diff_eq!(layer.vh_weight(2, 0).unwrap(), 0.55, epsilon = 1e-6);
    // Silent nodes do not learn feed-forward weights
    assert_eq!(layer.vh_weight(0, 0).unwrap(), 0.5);
}

#[test]
fn test_rewarded_learning_uses_traces() {
    let mut layer = identity_layer(0.5, 0.3);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    layer.set_visible_inputs(&one_hot(4, 2)).unwrap();
    layer.activate(20, 4, 0.25, 0.0, &mut rng).unwrap();
    let params = LearnParams::default();

    let mut unrewarded = layer.clone();
    unrewarded
        .learn_rewarded(&Array1::zeros(4), 0.9, &params)
        .unwrap();
    let c = unrewarded.hidden_node(2).unwrap().feed_forward[0];
    assert_eq!(c.weight, 0.5);
    // e = (1 - 0.9) * 1 * (1.0 - 0.5)
    assert_abs_diff_eq!(c.trace, 0.05, epsilon = 1e-6);
    // Threshold adaptation does not wait for reward
    assert!(unrewarded.hidden_node(2).unwrap().threshold > 0.3);

    let mut rewarded = layer.clone();
    rewarded
        .learn_rewarded(&Array1::from_elem(4, 1.0), 0.9, &params)
        .unwrap();
    // Δw = 0.1 * 1 * 0.05
    assert_abs_diff_eq!(rewarded.vh_weight(2, 0).unwrap(), 0.505, epsilon = 1e-6);

    let result = layer.learn_rewarded(&Array1::zeros(3), 0.9, &params);
    assert!(matches!(result, Err(SdrError::ShapeMismatch(_))));
}

#[test]
fn test_threshold_adaptation_reaches_target_sparsity() {
    let sparsity = 0.1;
    let params = LearnParams {
        feed_forward: 0.0,
        recurrent: 0.0,
        lateral: 0.0,
        threshold: 0.05,
        sparsity,
        ..LearnParams::default()
    };
    let input: Array1<f32> = (0..64).map(|i| ((i * 7) % 5) as f32 / 4.0).collect();

    for init_threshold in [0.0, 1.0] {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut layer = SparseLayer::create_random(
            &SparseLayerDesc {
                visible_size: GridSize::new(8, 8),
                hidden_size: GridSize::new(8, 8),
                receptive_radius: 2,
                recurrent_radius: 1,
                lateral_radius: 2,
            },
            (0.0, 0.2),
            (0.0, 0.05),
            init_threshold,
            &mut rng,
        )
        .expect("valid layer");
        layer.set_visible_inputs(&input).unwrap();

        let mut step = |layer: &mut SparseLayer| -> f32 {
            layer.activate(20, 4, 0.25, 0.0, &mut rng).unwrap();
            layer.learn(&params);
            let active = layer.hidden_spikes().mean().unwrap_or(0.0);
            layer.step_end();
            active
        };

        for _ in 0..1000 {
            step(&mut layer);
        }
        let measured = 2000;
        let total: f32 = (0..measured).map(|_| step(&mut layer)).sum();
        let rate = total / measured as f32;
        assert!(
            (rate - sparsity).abs() < 0.04,
            "init threshold {init_threshold}: firing rate {rate} vs target {sparsity}"
        );
    }
}

#[test]
fn test_receptive_field_rectangle() {
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let layer = SparseLayer::create_random(
        &SparseLayerDesc {
            visible_size: GridSize::new(4, 4),
            hidden_size: GridSize::new(4, 4),
            receptive_radius: 1,
            recurrent_radius: 1,
            lateral_radius: 1,
        },
        (0.1, 0.2),
        (0.0, 0.1),
        0.0,
        &mut rng,
    )
    .unwrap();

    let rect = layer.vh_weights(0, 0).unwrap();
    assert_eq!(rect.dim(), (3, 3));
    // Row and column above/left of the corner are clipped
    assert!(rect.row(0).iter().all(|&w| w == 0.0));
    assert!(rect.column(0).iter().all(|&w| w == 0.0));
    assert!(rect[[1, 1]] >= 0.1);
    assert_eq!(rect[[1, 1]], layer.vh_weight(0, 0).unwrap());

    assert!(matches!(
        layer.vh_weight(0, 99),
        Err(SdrError::OutOfBounds { .. })
    ));
    assert!(layer.vh_weights(4, 0).is_err());
}
