//! Online sequence driver and prediction metrics.
//!
//! The stack is trained and evaluated at the same time: every symbol first
//! scores the forecast made on the previous step, is then written into the
//! input field, and the stack steps and forecasts the symbol after it.

use rand::Rng;
use tracing::debug;

use crate::core::{PredictiveStack, SdrError, SdrResult};
use crate::data::{write_one_hot, Alphabet};

/// Factor of the exponential running average of the error rate.
const ERROR_AVERAGE_DECAY: f32 = 0.99;

/// Running prediction metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    /// Simulation steps taken
    pub steps: usize,
    /// Forecasts compared against the symbol that followed
    pub scored: usize,
    /// Forecasts that named the following symbol
    pub hits: usize,
    /// Exponential running average of the 0/1 error
    pub average_error: f32,
    /// Mean running surprise of the stack after the last step
    pub surprise: f32,
}

impl Metrics {
    /// Top-1 accuracy over every scored forecast.
    pub fn accuracy(&self) -> f32 {
        if self.scored == 0 {
            0.0
        } else {
            self.hits as f32 / self.scored as f32
        }
    }

    fn record(&mut self, hit: bool) {
        self.scored += 1;
        if hit {
            self.hits += 1;
        }
        let error = if hit { 0.0 } else { 1.0 };
        self.average_error =
            ERROR_AVERAGE_DECAY * self.average_error + (1.0 - ERROR_AVERAGE_DECAY) * error;
    }
}

/// A [`PredictiveStack`] fed one byte symbol per step.
#[derive(Debug, Clone)]
pub struct SequencePredictor {
    stack: PredictiveStack,
    alphabet: Alphabet,
    input: Vec<f32>,
    pending: Option<u8>,
    metrics: Metrics,
}

impl SequencePredictor {
    /// # Errors
    /// `ShapeMismatch` if the stack's input field cannot hold the alphabet.
    pub fn new(stack: PredictiveStack, alphabet: Alphabet) -> SdrResult<Self> {
        let field = stack.input_size().len();
        if field < alphabet.num_inputs() {
            return Err(SdrError::ShapeMismatch(format!(
                "input field of {field} cannot hold {} symbols",
                alphabet.num_inputs()
            )));
        }
        Ok(Self {
            stack,
            alphabet,
            input: vec![0.0; field],
            pending: None,
            metrics: Metrics::default(),
        })
    }

    /// Score the previous forecast against `symbol`, feed `symbol`, step,
    /// and return the forecast of the next symbol.
    ///
    /// Symbols outside the alphabet are fed as an all-zero input.
    pub fn step<R: Rng + ?Sized>(&mut self, symbol: u8, rng: &mut R) -> SdrResult<Option<u8>> {
        if let Some(expected) = self.pending {
            self.metrics.record(expected == symbol);
        }

        write_one_hot(&mut self.input, self.alphabet.index_of(symbol));
        for (i, &v) in self.input.iter().enumerate() {
            self.stack.set_input(i, v)?;
        }
        self.stack.sim_step(rng)?;

        self.pending = self.alphabet.decode_argmax(self.stack.prediction());
        self.metrics.steps += 1;
        self.metrics.surprise = self.stack.mean_surprise();
        Ok(self.pending)
    }

    /// Clear the counters, keeping the learned state.
    pub fn reset_metrics(&mut self) {
        self.metrics = Metrics::default();
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn stack(&self) -> &PredictiveStack {
        &self.stack
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Forecast made on the last step.
    pub fn pending(&self) -> Option<u8> {
        self.pending
    }
}

/// Stream `symbols` (wrapping around) through `predictor` for `steps` steps.
///
/// `on_step` sees the step index, the fed symbol and the forecast.
///
/// # Errors
/// `InvalidConfig` if `symbols` is empty; otherwise any stepping error.
pub fn run_sequence<R, F>(
    predictor: &mut SequencePredictor,
    symbols: &[u8],
    steps: usize,
    rng: &mut R,
    mut on_step: F,
) -> SdrResult<Metrics>
where
    R: Rng + ?Sized,
    F: FnMut(usize, u8, Option<u8>),
{
    if symbols.is_empty() {
        return Err(SdrError::InvalidConfig("symbol sequence is empty".to_string()));
    }

    for t in 0..steps {
        let symbol = symbols[t % symbols.len()];
        let forecast = predictor.step(symbol, rng)?;
        on_step(t, symbol, forecast);
    }

    let metrics = predictor.metrics().clone();
    debug!(
        steps = metrics.steps,
        accuracy = metrics.accuracy(),
        average_error = metrics.average_error,
        "sequence run finished"
    );
    Ok(metrics)
}
