mod reading_repository;

pub use reading_repository::*;
