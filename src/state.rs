mod json;

pub use json::JsonScheduleStore;
