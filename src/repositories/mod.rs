pub(crate) mod assignments;
pub(crate) mod exams;
pub(crate) mod questions;
pub(crate) mod users;
