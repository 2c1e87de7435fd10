pub mod item_grid;
pub mod media_item;
pub mod row_model;
pub mod selection;

pub use item_grid::*;
pub use media_item::*;
pub use row_model::*;
pub use selection::*;
