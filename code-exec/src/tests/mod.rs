pub mod utils;

mod languages;
