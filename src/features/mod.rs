pub mod engine;
pub mod scaler;
pub mod seasonality;

pub use engine::{FeatureConfig, FeatureEngine, FeatureError, FeatureKind, FeatureSet, TargetKind};
pub use scaler::{FeatureScale, ScalerKind, ScalerState};
pub use seasonality::{SeasonalEncoding, SeasonalityConfig};
