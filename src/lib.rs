pub mod batch;
pub mod config;
pub mod database;
pub mod final_grade;
pub mod github;
pub mod grading;
pub mod output;
pub mod records;
pub mod server;
pub mod workflows;
