mod layout;
mod palette;
mod rows;
mod source;
mod types;
mod zoom;

pub use layout::*;
pub use palette::*;
pub use rows::*;
pub use source::*;
pub use types::*;
pub use zoom::*;
