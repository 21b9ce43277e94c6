mod history;
mod move_token;
mod position;
mod result;

pub use history::*;
pub use move_token::*;
pub use position::*;
pub use result::*;
