//! Shared service layer used by the sync engine and the surrounding app.

mod catalog;

pub use catalog::CatalogService;
