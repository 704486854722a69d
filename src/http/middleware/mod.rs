pub mod inspection;

pub use inspection::inspection_middleware;
