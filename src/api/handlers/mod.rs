pub mod device;
pub mod health;
