pub mod images;
pub mod mount;
