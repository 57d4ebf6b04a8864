pub mod attendance;
pub mod common;
pub mod completions;
pub mod link;
pub mod reset;
pub mod scan;
pub mod sync;
pub mod token;
