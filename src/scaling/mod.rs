pub mod function_cache;
pub mod function_meta;
pub mod function_scaler;
pub mod scale_zero;
pub mod scaling_config;
pub mod scaling_error;
pub mod service_query;

pub use function_scaler::{FunctionScaleResult, FunctionScaler, ScaleOutcome};
pub use scale_zero::ScaleFromZero;
pub use scaling_config::ScalingConfig;
pub use scaling_error::{ScaleFromZeroError, ScalingError};
pub use service_query::{ExternalServiceQuery, ServiceQuery, ServiceQueryResponse};
