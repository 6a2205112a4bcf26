pub mod fs;
pub mod health;
pub mod tools;
pub mod whoami;
