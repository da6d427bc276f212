pub mod decision;
pub mod job;
pub mod limits;
pub mod settings;
pub mod tenant;
pub mod tools;
