pub mod clock;
pub mod models;
pub mod normalize;
pub mod upstream_payload;
