//! Body and sink abstractions for transfer payloads

mod body;
mod sink;

pub use body::BodySource;
pub use sink::ByteSink;
