pub mod authz;
pub mod cache;
pub mod clock;
pub mod credentials;
pub mod store;
