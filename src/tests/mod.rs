pub mod common;
mod extract;
