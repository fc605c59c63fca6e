pub mod analysis_provider;
pub mod analyzer;
pub mod concept_graph;
pub mod content_generator;
pub mod path_builder;
pub mod path_updater;
pub mod proficiency;
