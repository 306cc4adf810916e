pub mod keys;
pub mod uri;
