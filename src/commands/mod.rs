pub mod load_fixtures;
