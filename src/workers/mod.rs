pub mod janitor;
pub mod transcoder;
