pub mod aggregate;
pub mod render;
pub mod reports;
pub mod window;
