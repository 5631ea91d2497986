pub mod alert;
pub mod pattern;
pub mod repo;
pub mod result;

pub use alert::*;
pub use pattern::*;
pub use repo::*;
pub use result::*;
