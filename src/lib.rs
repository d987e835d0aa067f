//! Mean-variance portfolio optimization: moment estimation, the canonical
//! long-only portfolios, the efficient frontier, and the I/O glue around them.

pub mod config;
pub mod data;
pub mod error;
pub mod moments;
pub mod optimization;
pub mod portfolio;
pub mod report;
pub mod returns;
pub mod risk;
pub mod sampler;
pub mod server;
pub mod utils;
pub mod visualization;

pub use error::{EngineError, EngineResult};
pub use moments::MomentEstimate;
pub use portfolio::{Portfolio, PortfolioPoint, WeightVector};
pub use returns::ReturnsMatrix;
