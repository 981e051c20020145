pub mod dispatch;
pub mod env;
pub mod job;
pub mod run;
pub mod schema;
pub mod shared;
