pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod utils;

pub use config::PortalConfig;
pub use error::PortalError;
pub use models::{Account, Career, CourseAverage, CourseRow, Dashboard, Evaluation, LoginResponse, SubEvaluation};
pub use service::GradeService;
