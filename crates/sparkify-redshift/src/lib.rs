pub mod backend;
pub mod copy;

pub use backend::RedshiftBackend;
