pub mod analytics;
pub mod assessments;
pub mod classes;
pub mod core;
mod crud;
pub mod logs;
pub mod session;
pub mod skills;
pub mod students;
pub mod sync;
pub mod users;
