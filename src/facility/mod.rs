pub mod model;
pub mod service;

pub use model::{
    CreateCreditLineRequest, CreateFacilityRequest, CreditLine, Facility, FacilityAvailability,
    FacilityType,
};
pub use service::FacilityService;
