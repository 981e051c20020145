pub mod drive;
pub mod mapping;
pub mod rate;
