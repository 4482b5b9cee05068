mod handler;

pub use handler::ping;
