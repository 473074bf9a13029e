pub mod annotation_source;
pub mod batch;
pub mod frame_extractor;
pub mod planner;
pub mod report;
pub mod sanitize;
pub mod tier_selector;
