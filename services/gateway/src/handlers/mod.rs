pub mod exchange;
pub mod info;
