use axum::http::{Method, StatusCode};
use serde_json::json;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use crate::core::time::{format_date, primitive_now_utc};
use crate::repositories;
use crate::test_support;

fn future_date() -> String {
    format_date(OffsetDateTime::now_utc().date() + Duration::days(7))
}

fn past_date() -> String {
    format_date(OffsetDateTime::now_utc().date() - Duration::days(7))
}

fn exam_payload(class_name: &str) -> serde_json::Value {
    json!({
        "title": "Second term exam",
        "description": "Geometry fundamentals",
        "subject": "Mathematics",
        "className": class_name,
        "duration": 40,
        "totalPoints": 100,
        "examDate": future_date(),
        "examTime": "10:45",
        "questions": [
            {
                "text": "Sum of interior angles of a triangle?",
                "type": "single_choice",
                "points": 2,
                "options": ["90", "180", "270", "360"],
                "correctAnswer": "180"
            },
            {
                "text": "Define a right angle.",
                "type": "open",
                "correctAnswer": "An angle of exactly 90 degrees"
            }
        ]
    })
}

#[tokio::test]
async fn create_exam_assigns_every_active_student_in_class() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher = test_support::insert_teacher(db, "teacher001").await;
    let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    for n in 0..3 {
        test_support::insert_student(db, &format!("student10a-{n}"), "10a").await;
    }
    // Not eligible: suspended, or enrolled elsewhere
    test_support::insert_user_with_status(
        db,
        "student-suspended",
        "Suspended Student",
        "student-pass",
        crate::db::types::UserRole::Student,
        Some("10a"),
        crate::db::types::UserStatus::Suspended,
    )
    .await;
    test_support::insert_student(db, "student9b", "9b").await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(exam_payload("10a")),
        ))
        .await
        .expect("create exam");

    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");

    let exam_id = created["id"].as_str().expect("exam id").to_string();
    assert_eq!(created["class_name"], "10a");
    assert_eq!(created["questions"].as_array().unwrap().len(), 2);

    let assignees = created["assignees"].as_array().expect("assignees");
    assert_eq!(assignees.len(), 3);
    assert!(assignees.iter().all(|a| a["status"] == "pending"));

    let count = repositories::assignments::count_by_exam(db, &exam_id)
        .await
        .expect("count assignments");
    assert_eq!(count, 3);
}

#[tokio::test]
async fn create_exam_with_defaults_and_no_students() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher = test_support::insert_teacher(db, "teacher002").await;
    let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(json!({
                "title": "Pop quiz",
                "subject": "Physics",
                "className": "11c",
                "questions": [
                    {"text": "F = ?", "type": "open", "correctAnswer": "ma"}
                ]
            })),
        ))
        .await
        .expect("create exam");

    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["duration_minutes"], 30);
    assert_eq!(created["total_points"], 100);
    assert!(created["exam_date"].is_null());
    assert_eq!(created["assignees"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn student_cannot_create_exam() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let student = test_support::insert_student(db, "student001", "10a").await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(exam_payload("10a")),
        ))
        .await
        .expect("create exam");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/exams", None, None))
        .await
        .expect("list exams");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            None,
            Some(exam_payload("10a")),
        ))
        .await
        .expect("create exam");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_exam_without_questions_writes_nothing() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher = test_support::insert_teacher(db, "teacher003").await;
    let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    let mut payload = exam_payload("10a");
    payload["questions"] = json!([]);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(payload),
        ))
        .await
        .expect("create exam");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let exams: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM exams").fetch_one(db).await.expect("count");
    assert_eq!(exams, 0);
}

#[tokio::test]
async fn create_exam_with_missing_fields_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher = test_support::insert_teacher(db, "teacher004").await;
    let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    let mut payload = exam_payload("10a");
    payload["subject"] = json!("");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(payload),
        ))
        .await
        .expect("create exam");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Omitting a required field entirely is the same 400, not a 422 from
    // deserialization.
    let mut payload = exam_payload("10a");
    payload.as_object_mut().unwrap().remove("title");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&token),
            Some(payload),
        ))
        .await
        .expect("create exam");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn student_listing_never_exposes_answer_keys() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher = test_support::insert_teacher(db, "teacher005").await;
    let teacher_token = test_support::bearer_token(&teacher.id, ctx.state.settings());
    let student = test_support::insert_student(db, "student005", "10a").await;
    let student_token = test_support::bearer_token(&student.id, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&teacher_token),
            Some(exam_payload("10a")),
        ))
        .await
        .expect("create exam");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/exams",
            Some(&student_token),
            None,
        ))
        .await
        .expect("list exams");

    let status = response.status();
    let list = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {list}");

    let exams = list.as_array().expect("exam list");
    assert_eq!(exams.len(), 1);

    let questions = exams[0]["questions"].as_array().expect("questions");
    assert!(!questions.is_empty());
    for question in questions {
        assert!(
            question.get("correct_answer").is_none(),
            "answer key leaked: {question}"
        );
    }
    assert!(exams[0].get("assignees").is_none(), "assignee roster leaked to student");
}

#[tokio::test]
async fn listing_is_scoped_by_role_and_ordered_newest_first() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher_a = test_support::insert_teacher(db, "teacher006").await;
    let teacher_b = test_support::insert_teacher(db, "teacher007").await;
    let admin = test_support::insert_admin(db, "admin001").await;

    let token_a = test_support::bearer_token(&teacher_a.id, ctx.state.settings());
    let token_b = test_support::bearer_token(&teacher_b.id, ctx.state.settings());
    let admin_token = test_support::bearer_token(&admin.id, ctx.state.settings());

    for (token, title) in [(&token_a, "Exam A"), (&token_b, "Exam B")] {
        let mut payload = exam_payload("10a");
        payload["title"] = json!(title);
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/exams",
                Some(token),
                Some(payload),
            ))
            .await
            .expect("create exam");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/exams", Some(&token_a), None))
        .await
        .expect("list exams");
    let own = test_support::read_json(response).await;
    let own = own.as_array().expect("exam list");
    assert_eq!(own.len(), 1);
    assert_eq!(own[0]["title"], "Exam A");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/exams", Some(&admin_token), None))
        .await
        .expect("list exams");
    let all = test_support::read_json(response).await;
    let all = all.as_array().expect("exam list");
    assert_eq!(all.len(), 2);
    // Newest-created first
    assert_eq!(all[0]["title"], "Exam B");
    assert_eq!(all[1]["title"], "Exam A");
}

#[tokio::test]
async fn upcoming_filter_excludes_past_and_undated_exams() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher = test_support::insert_teacher(db, "teacher008").await;
    let token = test_support::bearer_token(&teacher.id, ctx.state.settings());

    let mut upcoming = exam_payload("10a");
    upcoming["title"] = json!("Upcoming");
    let mut past = exam_payload("10a");
    past["title"] = json!("Past");
    past["examDate"] = json!(past_date());
    let mut undated = exam_payload("10a");
    undated["title"] = json!("Undated");
    undated["examDate"] = serde_json::Value::Null;

    for payload in [upcoming, past, undated] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/exams",
                Some(&token),
                Some(payload),
            ))
            .await
            .expect("create exam");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/exams?status=upcoming&role=teacher",
            Some(&token),
            None,
        ))
        .await
        .expect("list exams");
    let list = test_support::read_json(response).await;
    let exams = list.as_array().expect("exam list");
    assert_eq!(exams.len(), 1, "response: {list}");
    assert_eq!(exams[0]["title"], "Upcoming");
}

#[tokio::test]
async fn get_exam_enforces_role_scoping() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let owner = test_support::insert_teacher(db, "teacher009").await;
    let other = test_support::insert_teacher(db, "teacher010").await;
    let assigned = test_support::insert_student(db, "student009", "10a").await;
    let outsider = test_support::insert_student(db, "student010", "9b").await;

    let owner_token = test_support::bearer_token(&owner.id, ctx.state.settings());
    let other_token = test_support::bearer_token(&other.id, ctx.state.settings());
    let assigned_token = test_support::bearer_token(&assigned.id, ctx.state.settings());
    let outsider_token = test_support::bearer_token(&outsider.id, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&owner_token),
            Some(exam_payload("10a")),
        ))
        .await
        .expect("create exam");
    let created = test_support::read_json(response).await;
    let exam_id = created["id"].as_str().expect("exam id");
    let uri = format!("/api/v1/exams/{exam_id}");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&owner_token), None))
        .await
        .expect("get exam");
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&other_token), None))
        .await
        .expect("get exam");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&assigned_token), None))
        .await
        .expect("get exam");
    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    for question in body["questions"].as_array().expect("questions") {
        assert!(question.get("correct_answer").is_none());
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&outsider_token), None))
        .await
        .expect("get exam");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_exam_cascades_and_checks_ownership() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let owner = test_support::insert_teacher(db, "teacher011").await;
    let other = test_support::insert_teacher(db, "teacher012").await;
    test_support::insert_student(db, "student011", "10a").await;

    let owner_token = test_support::bearer_token(&owner.id, ctx.state.settings());
    let other_token = test_support::bearer_token(&other.id, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams",
            Some(&owner_token),
            Some(exam_payload("10a")),
        ))
        .await
        .expect("create exam");
    let created = test_support::read_json(response).await;
    let exam_id = created["id"].as_str().expect("exam id").to_string();
    let uri = format!("/api/v1/exams/{exam_id}");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::DELETE, &uri, Some(&other_token), None))
        .await
        .expect("delete exam");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::DELETE, &uri, Some(&owner_token), None))
        .await
        .expect("delete exam");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let questions = repositories::questions::count_by_exam(db, &exam_id).await.expect("count");
    assert_eq!(questions, 0);
    let assignments = repositories::assignments::count_by_exam(db, &exam_id).await.expect("count");
    assert_eq!(assignments, 0);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::DELETE, &uri, Some(&owner_token), None))
        .await
        .expect("delete exam");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_question_insert_rolls_back_the_whole_exam() {
    let ctx = test_support::setup_test_context().await;
    let db = ctx.state.db();

    let teacher = test_support::insert_teacher(db, "teacher013").await;
    test_support::insert_student(db, "student013", "10a").await;

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();
    let question_id = Uuid::new_v4().to_string();

    let mut tx = db.begin().await.expect("begin");
    repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: "Doomed exam",
            description: None,
            subject: "Mathematics",
            class_name: "10a",
            duration_minutes: 30,
            total_points: 100,
            exam_date: None,
            exam_time: None,
            created_by: &teacher.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .expect("create exam");

    repositories::questions::create(
        &mut *tx,
        repositories::questions::CreateQuestion {
            id: &question_id,
            exam_id: &exam_id,
            text: "2 + 2 = ?",
            question_type: crate::db::types::QuestionType::SingleChoice,
            points: 1,
            options: vec!["3".to_string(), "4".to_string()],
            correct_answer: "4",
            created_by: &teacher.id,
            created_at: now,
        },
    )
    .await
    .expect("first question");

    // Duplicate primary key aborts the transaction mid-way
    let duplicate = repositories::questions::create(
        &mut *tx,
        repositories::questions::CreateQuestion {
            id: &question_id,
            exam_id: &exam_id,
            text: "3 + 3 = ?",
            question_type: crate::db::types::QuestionType::SingleChoice,
            points: 1,
            options: vec!["5".to_string(), "6".to_string()],
            correct_answer: "6",
            created_by: &teacher.id,
            created_at: now,
        },
    )
    .await;
    assert!(duplicate.is_err());
    drop(tx);

    let exam = repositories::exams::find_by_id(db, &exam_id).await.expect("find");
    assert!(exam.is_none(), "exam row survived a rolled-back transaction");
    let questions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_id = $1")
        .bind(&exam_id)
        .fetch_one(db)
        .await
        .expect("count");
    assert_eq!(questions, 0);
}
