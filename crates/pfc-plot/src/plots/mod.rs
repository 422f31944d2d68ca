pub mod fit_grid;
pub mod frame;
pub mod graph;
pub mod hist;
pub mod stack;
