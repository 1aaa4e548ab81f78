//! Stacked LSTM forecaster.
//!
//! Each layer keeps its four gates in one `(4H, I + H)` matrix acting on the
//! concatenation `[x_t; h_{t-1}]`, gate order input, forget, candidate,
//! output. The final hidden state of the top layer goes through a linear
//! head to a scalar. Training is full backpropagation through time with
//! Adam, global-norm gradient clipping and variational dropout (one mask per
//! layer per window, inverted so inference needs no rescaling).

use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::window::Window;

use super::cancel::CancellationToken;
use super::config::ModelConfig;
use super::optim::{Adam, AdamStep};
use super::traits::{EpochLoss, ForecastModel, ModelError, StopReason, TrainingReport};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LstmLayer {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// Activations of one layer at one time step, kept for the backward pass.
#[derive(Debug, Clone)]
struct StepCache {
    z: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c_prev: Array1<f64>,
    c: Array1<f64>,
    tanh_c: Array1<f64>,
    h: Array1<f64>,
}

impl LstmLayer {
    fn init(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let weights = Array2::random_using(
            (4 * hidden_size, input_size + hidden_size),
            Uniform::new(-limit, limit),
            rng,
        );
        let mut bias = Array1::zeros(4 * hidden_size);
        // Forget gate starts open.
        bias.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);
        Self { weights, bias }
    }

    fn zeros_like(&self) -> Self {
        Self {
            weights: Array2::zeros(self.weights.dim()),
            bias: Array1::zeros(self.bias.len()),
        }
    }

    fn hidden_size(&self) -> usize {
        self.bias.len() / 4
    }

    fn input_size(&self) -> usize {
        self.weights.ncols() - self.hidden_size()
    }

    fn step(&self, x: ArrayView1<'_, f64>, h: &Array1<f64>, c: &Array1<f64>) -> StepCache {
        let n_in = self.input_size();
        let hs = self.hidden_size();

        let mut z = Array1::zeros(n_in + hs);
        z.slice_mut(s![..n_in]).assign(&x);
        z.slice_mut(s![n_in..]).assign(h);

        let a = self.weights.dot(&z) + &self.bias;
        let i = a.slice(s![0..hs]).mapv(sigmoid);
        let f = a.slice(s![hs..2 * hs]).mapv(sigmoid);
        let g = a.slice(s![2 * hs..3 * hs]).mapv(f64::tanh);
        let o = a.slice(s![3 * hs..4 * hs]).mapv(sigmoid);

        let c_next = &f * c + &i * &g;
        let tanh_c = c_next.mapv(f64::tanh);
        let h_next = &o * &tanh_c;

        StepCache {
            z,
            i,
            f,
            g,
            o,
            c_prev: c.clone(),
            c: c_next,
            tanh_c,
            h: h_next,
        }
    }
}

/// Hidden and cell state for every layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentState {
    pub hidden: Vec<Array1<f64>>,
    pub cell: Vec<Array1<f64>>,
}

impl RecurrentState {
    pub fn zeros(num_layers: usize, hidden_size: usize) -> Self {
        Self {
            hidden: vec![Array1::zeros(hidden_size); num_layers],
            cell: vec![Array1::zeros(hidden_size); num_layers],
        }
    }
}

/// Forward activations of one training window.
struct Trace {
    steps: Vec<Vec<StepCache>>,
    head_input: Array1<f64>,
    output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LstmParams {
    layers: Vec<LstmLayer>,
    head_weights: Array1<f64>,
    head_bias: Array1<f64>,
}

impl LstmParams {
    fn init(input_size: usize, hidden_size: usize, num_layers: usize, rng: &mut StdRng) -> Self {
        let mut layers = Vec::with_capacity(num_layers);
        layers.push(LstmLayer::init(input_size, hidden_size, rng));
        for _ in 1..num_layers {
            layers.push(LstmLayer::init(hidden_size, hidden_size, rng));
        }
        let limit = (1.0 / hidden_size as f64).sqrt();
        Self {
            layers,
            head_weights: Array1::random_using(hidden_size, Uniform::new(-limit, limit), rng),
            head_bias: Array1::zeros(1),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            layers: self.layers.iter().map(LstmLayer::zeros_like).collect(),
            head_weights: Array1::zeros(self.head_weights.len()),
            head_bias: Array1::zeros(1),
        }
    }

    fn hidden_size(&self) -> usize {
        self.head_weights.len()
    }

    fn norm(&self) -> f64 {
        let mut sq = self.head_weights.mapv(|v| v * v).sum() + self.head_bias.mapv(|v| v * v).sum();
        for layer in &self.layers {
            sq += layer.weights.mapv(|v| v * v).sum() + layer.bias.mapv(|v| v * v).sum();
        }
        sq.sqrt()
    }

    fn scale(&mut self, k: f64) {
        for layer in &mut self.layers {
            layer.weights *= k;
            layer.bias *= k;
        }
        self.head_weights *= k;
        self.head_bias *= k;
    }

    fn apply_adam(&mut self, grads: &Self, m: &mut Self, v: &mut Self, step: &AdamStep) {
        for (((p, g), m), v) in self
            .layers
            .iter_mut()
            .zip(&grads.layers)
            .zip(m.layers.iter_mut())
            .zip(v.layers.iter_mut())
        {
            step.update(&mut p.weights, &g.weights, &mut m.weights, &mut v.weights);
            step.update(&mut p.bias, &g.bias, &mut m.bias, &mut v.bias);
        }
        step.update(
            &mut self.head_weights,
            &grads.head_weights,
            &mut m.head_weights,
            &mut v.head_weights,
        );
        step.update(&mut self.head_bias, &grads.head_bias, &mut m.head_bias, &mut v.head_bias);
    }

    /// Forward pass from zero state with one dropout mask per layer.
    fn forward_train(&self, input: ArrayView2<'_, f64>, masks: &[Array1<f64>]) -> Trace {
        let seq_len = input.nrows();
        let hs = self.hidden_size();
        let mut steps = Vec::with_capacity(self.layers.len());
        let mut layer_input = input.to_owned();

        for (layer, mask) in self.layers.iter().zip(masks) {
            let mut h = Array1::zeros(hs);
            let mut c = Array1::zeros(hs);
            let mut caches = Vec::with_capacity(seq_len);
            let mut outputs = Array2::zeros((seq_len, hs));
            for t in 0..seq_len {
                let cache = layer.step(layer_input.row(t), &h, &c);
                h = cache.h.clone();
                c = cache.c.clone();
                outputs.row_mut(t).assign(&(&cache.h * mask));
                caches.push(cache);
            }
            steps.push(caches);
            layer_input = outputs;
        }

        let head_input = layer_input.row(seq_len - 1).to_owned();
        let output = self.head_weights.dot(&head_input) + self.head_bias[0];
        Trace {
            steps,
            head_input,
            output,
        }
    }

    /// Accumulate into `grads` the gradient of the loss given `d_out = dL/dy`.
    fn backward(&self, trace: &Trace, masks: &[Array1<f64>], d_out: f64, grads: &mut Self) {
        let hs = self.hidden_size();
        grads.head_weights.scaled_add(d_out, &trace.head_input);
        grads.head_bias[0] += d_out;

        let seq_len = trace.steps[0].len();
        // Gradient w.r.t. the masked outputs of the layer being processed.
        let mut d_outputs = Array2::<f64>::zeros((seq_len, hs));
        d_outputs
            .row_mut(seq_len - 1)
            .assign(&(&self.head_weights * d_out));

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let grad = &mut grads.layers[l];
            let n_in = layer.input_size();
            let mut d_inputs = Array2::<f64>::zeros((seq_len, n_in));
            let mut dh_next = Array1::<f64>::zeros(hs);
            let mut dc_next = Array1::<f64>::zeros(hs);

            for t in (0..seq_len).rev() {
                let st = &trace.steps[l][t];
                let dh = &d_outputs.row(t) * &masks[l] + &dh_next;
                let d_o = &dh * &st.tanh_c;
                let dc = &dh * &st.o * &st.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
                let d_i = &dc * &st.g;
                let d_g = &dc * &st.i;
                let d_f = &dc * &st.c_prev;
                dc_next = &dc * &st.f;

                let mut da = Array1::<f64>::zeros(4 * hs);
                da.slice_mut(s![0..hs]).assign(&(d_i * st.i.mapv(|v| v * (1.0 - v))));
                da.slice_mut(s![hs..2 * hs]).assign(&(d_f * st.f.mapv(|v| v * (1.0 - v))));
                da.slice_mut(s![2 * hs..3 * hs]).assign(&(d_g * st.g.mapv(|v| 1.0 - v * v)));
                da.slice_mut(s![3 * hs..4 * hs]).assign(&(d_o * st.o.mapv(|v| v * (1.0 - v))));

                let outer = da
                    .view()
                    .insert_axis(Axis(1))
                    .dot(&st.z.view().insert_axis(Axis(0)));
                grad.weights += &outer;
                grad.bias += &da;

                let dz = layer.weights.t().dot(&da);
                d_inputs.row_mut(t).assign(&dz.slice(s![..n_in]));
                dh_next = dz.slice(s![n_in..]).to_owned();
            }
            d_outputs = d_inputs;
        }
    }

    /// Inference without dropout, advancing `state` through the sequence.
    fn infer(&self, input: ArrayView2<'_, f64>, state: &mut RecurrentState) -> f64 {
        for row in input.rows() {
            let mut x = row.to_owned();
            for (l, layer) in self.layers.iter().enumerate() {
                let cache = layer.step(x.view(), &state.hidden[l], &state.cell[l]);
                state.cell[l] = cache.c;
                state.hidden[l] = cache.h;
                x = state.hidden[l].clone();
            }
        }
        let top = state.hidden.last().map_or(0.0, |h| self.head_weights.dot(h));
        top + self.head_bias[0]
    }
}

fn dropout_masks(rng: &mut StdRng, num_layers: usize, hidden_size: usize, dropout: f64) -> Vec<Array1<f64>> {
    if dropout <= 0.0 {
        return vec![Array1::ones(hidden_size); num_layers];
    }
    let keep = 1.0 - dropout;
    (0..num_layers)
        .map(|_| Array1::from_shape_fn(hidden_size, |_| if rng.gen::<f64>() < keep { 1.0 / keep } else { 0.0 }))
        .collect()
}

/// Chronological split: the last `fraction` of windows become the validation tail.
fn split_validation(windows: &[Window], fraction: f64) -> (&[Window], &[Window]) {
    let n = windows.len();
    let n_val = (n as f64 * fraction).floor() as usize;
    if n_val == 0 || n_val >= n {
        return (windows, &[]);
    }
    windows.split_at(n - n_val)
}

/// LSTM forecaster implementing [`ForecastModel`].
#[derive(Debug, Clone)]
pub struct LstmForecaster {
    config: ModelConfig,
    params: Option<LstmParams>,
    input_shape: Option<(usize, usize)>,
    state: Option<RecurrentState>,
}

impl LstmForecaster {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            params: None,
            input_shape: None,
            state: None,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Carried recurrent state, if any.
    pub fn state(&self) -> Option<&RecurrentState> {
        self.state.as_ref()
    }

    fn mse(params: &LstmParams, windows: &[Window], num_layers: usize) -> f64 {
        let total: f64 = windows
            .iter()
            .map(|w| {
                let mut state = RecurrentState::zeros(num_layers, params.hidden_size());
                let err = params.infer(w.input.view(), &mut state) - w.target;
                err * err
            })
            .sum();
        total / windows.len() as f64
    }
}

impl ForecastModel for LstmForecaster {
    fn name(&self) -> &str {
        "lstm"
    }

    fn train(
        &mut self,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<TrainingReport, ModelError> {
        let first = windows.first().ok_or(ModelError::NoTrainingData)?;
        let shape = first.input.dim();
        if let Some(bad) = windows.iter().find(|w| w.input.dim() != shape) {
            return Err(ModelError::InputShape {
                expected: shape,
                got: bad.input.dim(),
            });
        }
        if shape.0 == 0 {
            return Err(ModelError::InputShape {
                expected: (1, shape.1),
                got: shape,
            });
        }

        let cfg = &self.config;
        let (train_set, validation) = split_validation(windows, cfg.validation_split);
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut params = LstmParams::init(shape.1, cfg.hidden_size, cfg.num_layers, &mut rng);
        let mut adam = Adam::new(cfg.learning_rate);
        let mut m = params.zeros_like();
        let mut v = params.zeros_like();

        let mut best = params.clone();
        let mut best_loss = f64::INFINITY;
        let mut best_epoch = None;
        let mut since_best = 0;
        let mut history = Vec::with_capacity(cfg.epochs);
        let mut stop_reason = StopReason::Completed;
        let mut order: Vec<usize> = (0..train_set.len()).collect();

        for epoch in 0..cfg.epochs {
            if cancel.is_cancelled() {
                warn!(epoch, best_epoch = ?best_epoch, "training cancelled");
                stop_reason = StopReason::Cancelled;
                break;
            }
            if cfg.shuffle {
                order.shuffle(&mut rng);
            }

            let mut total = 0.0;
            for batch in order.chunks(cfg.batch_size) {
                let mut grads = params.zeros_like();
                let scale = 1.0 / batch.len() as f64;
                for &idx in batch {
                    let window = &train_set[idx];
                    let masks = dropout_masks(&mut rng, cfg.num_layers, cfg.hidden_size, cfg.dropout);
                    let trace = params.forward_train(window.input.view(), &masks);
                    let err = trace.output - window.target;
                    total += err * err;
                    params.backward(&trace, &masks, 2.0 * err * scale, &mut grads);
                }
                if let Some(clip) = cfg.gradient_clip {
                    let norm = grads.norm();
                    if norm.is_finite() && norm > clip {
                        grads.scale(clip / norm);
                    }
                }
                params.apply_adam(&grads, &mut m, &mut v, &adam.step());
            }

            let train_loss = total / train_set.len() as f64;
            if !train_loss.is_finite() {
                return Err(ModelError::TrainingDiverged {
                    epoch,
                    loss: train_loss,
                });
            }
            let validation_loss =
                (!validation.is_empty()).then(|| Self::mse(&params, validation, cfg.num_layers));
            if let Some(loss) = validation_loss.filter(|l| !l.is_finite()) {
                return Err(ModelError::TrainingDiverged { epoch, loss });
            }

            debug!(epoch, train_loss, validation_loss = ?validation_loss, "epoch complete");
            history.push(EpochLoss {
                epoch,
                train_loss,
                validation_loss,
            });

            let monitored = validation_loss.unwrap_or(train_loss);
            if monitored < best_loss {
                best_loss = monitored;
                best = params.clone();
                best_epoch = Some(epoch);
                since_best = 0;
            } else {
                since_best += 1;
                if cfg.patience > 0 && since_best >= cfg.patience {
                    debug!(epoch, best_epoch = ?best_epoch, "early stopping");
                    stop_reason = StopReason::EarlyStopped;
                    break;
                }
            }
        }

        self.params = Some(best);
        self.input_shape = Some(shape);
        self.state = None;

        Ok(TrainingReport {
            epochs_run: history.len(),
            best_epoch,
            best_loss,
            history,
            stop_reason,
        })
    }

    fn predict(&mut self, input: ArrayView2<'_, f64>) -> Result<f64, ModelError> {
        let params = self.params.as_ref().ok_or(ModelError::NotTrained)?;
        let expected = self.input_shape.ok_or(ModelError::NotTrained)?;
        if input.dim() != expected {
            return Err(ModelError::InputShape {
                expected,
                got: input.dim(),
            });
        }

        let fresh = || RecurrentState::zeros(params.layers.len(), params.hidden_size());
        let mut state = if self.config.carry_state {
            self.state.take().unwrap_or_else(fresh)
        } else {
            fresh()
        };
        let prediction = params.infer(input, &mut state);
        if self.config.carry_state {
            self.state = Some(state);
        }

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(ModelError::NonFinitePrediction)
        }
    }

    fn reset_state(&mut self) {
        self.state = None;
    }

    fn is_trained(&self) -> bool {
        self.params.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn windows(n: usize, window_len: usize) -> Vec<Window> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let series: Vec<f64> = (0..n + window_len + 1)
            .map(|i| 0.5 + 0.4 * (i as f64 * 0.3).sin())
            .collect();
        (0..n)
            .map(|i| {
                let input = Array2::from_shape_fn((window_len, 2), |(t, j)| {
                    if j == 0 {
                        series[i + t]
                    } else {
                        1.0 - series[i + t]
                    }
                });
                Window {
                    input,
                    target: series[i + window_len],
                    target_index: i + window_len,
                    target_timestamp: start + Duration::days((i + window_len) as i64),
                }
            })
            .collect()
    }

    fn config() -> ModelConfig {
        ModelConfig::small().with_dropout(0.0)
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = LstmParams::init(2, 3, 2, &mut rng);
        let window = &windows(1, 4)[0];
        let masks = dropout_masks(&mut rng, 2, 3, 0.0);

        let loss = |p: &LstmParams| {
            let err = p.forward_train(window.input.view(), &masks).output - window.target;
            err * err
        };
        let trace = params.forward_train(window.input.view(), &masks);
        let mut grads = params.zeros_like();
        params.backward(&trace, &masks, 2.0 * (trace.output - window.target), &mut grads);

        let eps = 1e-6;
        let check = |analytic: f64, mutate: &dyn Fn(&mut LstmParams, f64)| {
            let mut plus = params.clone();
            mutate(&mut plus, eps);
            let mut minus = params.clone();
            mutate(&mut minus, -eps);
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!(
                (numeric - analytic).abs() < 1e-6 * analytic.abs().max(1.0),
                "numeric {numeric} vs analytic {analytic}"
            );
        };

        check(grads.layers[0].weights[[1, 2]], &|p, d| p.layers[0].weights[[1, 2]] += d);
        check(grads.layers[0].weights[[7, 0]], &|p, d| p.layers[0].weights[[7, 0]] += d);
        check(grads.layers[0].bias[4], &|p, d| p.layers[0].bias[4] += d);
        check(grads.layers[1].weights[[10, 4]], &|p, d| p.layers[1].weights[[10, 4]] += d);
        check(grads.layers[1].bias[11], &|p, d| p.layers[1].bias[11] += d);
        check(grads.head_weights[2], &|p, d| p.head_weights[2] += d);
        check(grads.head_bias[0], &|p, d| p.head_bias[0] += d);
    }

    #[test]
    fn test_dropout_masks_are_inverted() {
        let mut rng = StdRng::seed_from_u64(1);
        let masks = dropout_masks(&mut rng, 2, 50, 0.5);
        assert_eq!(masks.len(), 2);
        assert!(masks
            .iter()
            .flat_map(|m| m.iter())
            .all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_training_reduces_loss() {
        let data = windows(120, 6);
        let mut model = LstmForecaster::new(config().with_epochs(40).with_batch_size(8));
        let report = model.train(&data, &CancellationToken::new()).unwrap();

        let first = report.history[0].train_loss;
        let last = report.final_train_loss().unwrap();
        assert!(last < first, "loss did not improve: {first} -> {last}");
        assert!(model.is_trained());
    }

    #[test]
    fn test_best_params_are_restored() {
        let data = windows(80, 5);
        let mut model = LstmForecaster::new(config().with_epochs(15));
        let report = model.train(&data, &CancellationToken::new()).unwrap();

        let best_epoch = report.best_epoch.unwrap();
        let monitored: Vec<f64> = report
            .history
            .iter()
            .map(|e| e.validation_loss.unwrap())
            .collect();
        let min = monitored.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_eq!(report.best_loss, min);
        assert_eq!(monitored[best_epoch], min);

        // The restored model reproduces the best validation loss.
        let validation = split_validation(&data, model.config().validation_split).1;
        let mse = LstmForecaster::mse(model.params.as_ref().unwrap(), validation, 1);
        assert!((mse - min).abs() < 1e-12);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = windows(60, 5);
        let cfg = ModelConfig::small().with_dropout(0.3);
        let mut a = LstmForecaster::new(cfg.clone());
        let mut b = LstmForecaster::new(cfg);
        let ra = a.train(&data, &CancellationToken::new()).unwrap();
        let rb = b.train(&data, &CancellationToken::new()).unwrap();
        assert_eq!(ra, rb);

        let input = data[10].input.view();
        assert_eq!(a.predict(input).unwrap(), b.predict(input).unwrap());
    }

    #[test]
    fn test_cancel_before_first_epoch_returns_initial_params() {
        let data = windows(30, 4);
        let token = CancellationToken::new();
        token.cancel();
        let mut model = LstmForecaster::new(config());
        let report = model.train(&data, &token).unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.epochs_run, 0);
        assert_eq!(report.best_epoch, None);
        assert!(model.predict(data[0].input.view()).unwrap().is_finite());
    }

    #[test]
    fn test_non_finite_loss_diverges() {
        let mut data = windows(20, 4);
        data[3].target = f64::NAN;
        let mut model = LstmForecaster::new(config());
        let err = model.train(&data, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ModelError::TrainingDiverged { epoch: 0, .. }));
        assert!(!model.is_trained());
    }

    #[test]
    fn test_predict_requires_training_and_shape() {
        let data = windows(20, 4);
        let mut model = LstmForecaster::new(config());
        assert_eq!(
            model.predict(data[0].input.view()).unwrap_err(),
            ModelError::NotTrained
        );
        assert_eq!(
            model.train(&[], &CancellationToken::new()).unwrap_err(),
            ModelError::NoTrainingData
        );

        model.train(&data, &CancellationToken::new()).unwrap();
        let wrong = Array2::zeros((3, 2));
        assert!(matches!(
            model.predict(wrong.view()),
            Err(ModelError::InputShape { expected: (4, 2), got: (3, 2) })
        ));
    }

    #[test]
    fn test_carry_state_and_reset() {
        let data = windows(30, 4);
        let mut model = LstmForecaster::new(config().with_carry_state(true));
        model.train(&data, &CancellationToken::new()).unwrap();

        let input = data[5].input.view();
        let first = model.predict(input).unwrap();
        assert!(model.state().is_some());
        model.predict(input).unwrap();

        model.reset_state();
        assert!(model.state().is_none());
        assert_eq!(model.predict(input).unwrap(), first);
    }

    #[test]
    fn test_stateless_predictions_repeat() {
        let data = windows(30, 4);
        let mut model = LstmForecaster::new(config());
        model.train(&data, &CancellationToken::new()).unwrap();
        let input = data[5].input.view();
        assert_eq!(model.predict(input).unwrap(), model.predict(input).unwrap());
        assert!(model.state().is_none());
    }
}
