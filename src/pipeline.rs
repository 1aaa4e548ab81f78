//! End-to-end pipeline: align, backtest, forecast forward and allocate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ndarray::{Array1, Array2};
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{Aligner, Dataset, RawSeries, Timestamp};
use crate::features::{FeatureEngine, TargetKind};
use crate::portfolio::{returns_from_levels, sample_covariance, shrink_covariance, Portfolio, PortfolioOptimizer};
use crate::regime::{RegimeSource, ThresholdRegimeRule};
use crate::walkforward::{BacktestReport, Backtester, ForecastRecord};
use crate::{Error, Result};

/// Forward forecasts and the portfolio built from them.
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    pub forecasts: BTreeMap<String, ForecastRecord>,
    /// Expected return per asset fed to the optimizer.
    pub expected_returns: BTreeMap<String, f64>,
    pub portfolio: Portfolio,
}

/// Configured pipeline. Cheap to clone; holds no fitted state.
#[derive(Clone)]
pub struct ForecastPipeline {
    config: PipelineConfig,
    regime: Option<Arc<dyn RegimeSource>>,
}

impl ForecastPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, regime: None })
    }

    /// Use an external regime signal instead of the configured threshold rule.
    pub fn with_regime_source(mut self, source: Arc<dyn RegimeSource>) -> Self {
        self.regime = Some(source);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn aligner(&self) -> Aligner {
        Aligner::new(self.config.aligner.clone())
    }

    pub fn feature_engine(&self) -> FeatureEngine {
        let engine = FeatureEngine::new(self.config.features.clone());
        if !self.config.features.include_regime {
            return engine;
        }
        let source = self
            .regime
            .clone()
            .unwrap_or_else(|| Arc::new(ThresholdRegimeRule::new(self.config.regime.clone())));
        engine.with_regime_source(source)
    }

    pub fn backtester(&self) -> Backtester {
        Backtester::new(
            self.feature_engine(),
            self.config.window_len,
            self.config.model.clone(),
            self.config.folds.clone(),
        )
    }

    pub fn align(&self, series: &[RawSeries]) -> Result<Dataset> {
        Ok(self.aligner().align(series)?)
    }

    /// Align one asset's series and run the walk-forward backtest.
    ///
    /// Fails with [`Error::LookaheadFill`] if a fill method would carry
    /// observations from after a fold cutoff into its training rows.
    pub fn backtest(&self, series: &[RawSeries]) -> Result<BacktestReport> {
        self.check_causal_fill()?;
        let aligned = self.align(series)?;
        info!(
            "Aligned {} rows x {} columns",
            aligned.len(),
            aligned.n_features()
        );
        Ok(self.backtester().run(&aligned)?)
    }

    /// Backtest independent assets in parallel.
    pub fn backtest_assets(
        &self,
        assets: &BTreeMap<String, Vec<RawSeries>>,
    ) -> Result<BTreeMap<String, BacktestReport>> {
        self.check_causal_fill()?;
        let aligned = self.align_assets(assets)?;
        self.backtester()
            .run_assets(&aligned)
            .into_iter()
            .map(|(asset, result)| match result {
                Ok(report) => Ok((asset, report)),
                Err(e) => Err(Error::asset(asset, e.into())),
            })
            .collect()
    }

    /// Forecast each asset at `at`, estimate the return covariance over the
    /// shared history and optimize the allocation.
    pub fn allocate(&self, assets: &BTreeMap<String, Vec<RawSeries>>, at: Timestamp) -> Result<AllocationOutcome> {
        let aligned = self.align_assets(assets)?;

        let mut forecasts = BTreeMap::new();
        for (asset, result) in self.backtester().forecast_assets(&aligned, at) {
            let record = result.map_err(|e| Error::asset(asset.clone(), e.into()))?;
            forecasts.insert(asset, record);
        }

        let mut expected_returns = BTreeMap::new();
        for (asset, record) in &forecasts {
            let mu = match self.config.features.target_kind {
                TargetKind::Return => Some(record.predicted),
                TargetKind::Level => record
                    .previous
                    .filter(|p| p.abs() > f64::EPSILON)
                    .map(|p| record.predicted / p - 1.0),
            };
            let mu = mu.ok_or_else(|| Error::NoReturnBasis(asset.clone()))?;
            expected_returns.insert(asset.clone(), mu);
        }

        let ids: Vec<String> = expected_returns.keys().cloned().collect();
        let mu: Array1<f64> = expected_returns.values().copied().collect();
        let cov = self.return_covariance(&aligned)?;

        let optimizer = PortfolioOptimizer::new(self.config.optimizer.clone());
        let portfolio = optimizer.allocate(&ids, mu.view(), cov.view())?;
        info!(
            "Allocated {} assets: expected return {:.6}, variance {:.6}",
            ids.len(),
            portfolio.expected_return,
            portfolio.variance
        );

        Ok(AllocationOutcome {
            forecasts,
            expected_returns,
            portfolio,
        })
    }

    /// Shrunk sample covariance of target-column returns on the timestamps
    /// every asset shares. Assets in key order.
    pub fn return_covariance(&self, aligned: &BTreeMap<String, Dataset>) -> Result<Array2<f64>> {
        let target = &self.config.features.target;
        let mut levels_by_asset = Vec::with_capacity(aligned.len());
        for (asset, ds) in aligned {
            let col = ds
                .column_index(target)
                .ok_or_else(|| Error::asset(asset.clone(), Error::UnknownColumn(target.clone())))?;
            let levels: BTreeMap<Timestamp, f64> = ds
                .timestamps()
                .iter()
                .copied()
                .zip(ds.column(col).iter().copied())
                .collect();
            levels_by_asset.push(levels);
        }

        let mut common: BTreeSet<Timestamp> = levels_by_asset
            .first()
            .map(|l| l.keys().copied().collect())
            .unwrap_or_default();
        for levels in levels_by_asset.iter().skip(1) {
            common.retain(|ts| levels.contains_key(ts));
        }

        let rows: Vec<Timestamp> = common.into_iter().collect();
        let levels = Array2::from_shape_fn((rows.len(), levels_by_asset.len()), |(t, j)| {
            levels_by_asset[j].get(&rows[t]).copied().unwrap_or(f64::NAN)
        });
        let returns = returns_from_levels(levels.view());
        let cov = sample_covariance(returns.view())?;
        Ok(shrink_covariance(cov.view(), self.config.covariance_shrinkage)?)
    }

    fn check_causal_fill(&self) -> Result<()> {
        match self.config.aligner.lookahead_series() {
            Some(series) => Err(Error::LookaheadFill(series.to_string())),
            None => Ok(()),
        }
    }

    fn align_assets(&self, assets: &BTreeMap<String, Vec<RawSeries>>) -> Result<BTreeMap<String, Dataset>> {
        let aligner = self.aligner();
        assets
            .iter()
            .map(|(asset, series)| {
                aligner
                    .align(series)
                    .map(|ds| (asset.clone(), ds))
                    .map_err(|e| Error::asset(asset.clone(), e.into()))
            })
            .collect()
    }
}
