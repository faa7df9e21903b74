pub mod admissions;
pub mod agencies;
pub mod applications;
pub mod destinations;
pub mod elt_requirements;
pub mod notes;
pub mod organizations;
pub mod support;
