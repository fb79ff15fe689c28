pub mod coordinator;
pub mod deliver;
pub mod encode;
pub mod extract;
pub mod ports;
pub mod render;
