pub mod supr_model;

pub use supr_model::SuprModel;
