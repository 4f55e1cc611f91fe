pub mod model;
pub mod service;

pub use model::{
    AssignCollateralRequest, AssignmentTarget, Collateral, CollateralAssignment,
    CreateCollateralRequest,
};
pub use service::CollateralService;
