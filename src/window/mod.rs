pub mod builder;

pub use builder::{Window, WindowBuilder, WindowError, Windows};
