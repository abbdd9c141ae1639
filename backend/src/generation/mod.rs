pub mod completions_service;
pub mod recipe_generator;
