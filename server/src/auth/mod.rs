pub mod extract;
pub mod jwt;
