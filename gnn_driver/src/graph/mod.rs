pub mod data;
pub mod dataset;
pub mod evaluate;
pub mod model;
pub mod train;
