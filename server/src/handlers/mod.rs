//! Request parsing shared by the routes.

mod if_match;
mod search;

pub use if_match::*;
pub use search::*;
