pub mod attributes;
pub mod tax_service;


pub use attributes::SensorAttributes;
pub use tax_service::TouristTaxService;
