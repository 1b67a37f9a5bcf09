use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum ExamStatusFilter {
    Upcoming,
}

/// Query string for GET /exams. The listing page also sends a `role`
/// parameter; the effective role always comes from the token, so it is
/// ignored here.
#[derive(Debug, Deserialize)]
pub(super) struct ListExamsQuery {
    #[serde(default)]
    pub(super) status: Option<ExamStatusFilter>,
}
