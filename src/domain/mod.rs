pub mod plant;
pub mod prices;
pub mod result;
pub mod time_index;

pub use plant::*;
pub use prices::*;
pub use result::*;
pub use time_index::*;
