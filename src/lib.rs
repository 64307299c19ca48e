pub mod config;
pub mod extract;
pub mod fingerprint;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod pipeline;
pub mod reconcile;
pub mod render;
pub mod snapshot;
