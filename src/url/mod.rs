//! URL normalization and domain extraction.

mod domain;
mod normalize;

pub use domain::extract_domain;
pub use normalize::normalize_url;
