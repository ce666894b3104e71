mod broadcaster;
mod reading;
mod repository;
mod result;

pub use broadcaster::*;
pub use reading::*;
pub use repository::*;
pub use result::*;
