pub mod etl;

pub use crate::domain::model::{Dataset, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
