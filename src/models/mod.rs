pub mod alert;
pub mod api;
pub mod job;
pub mod product;
pub mod reference;
