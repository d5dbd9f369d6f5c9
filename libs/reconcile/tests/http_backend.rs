//! HTTP adapter tests against a mock server.

mod support;

use serde_json::json;
use smartbed_reconcile::model::{
    AcuityScore, BedStatus, NewPatient, Pressure, Scenario, SimRequest, TriageLevel,
};
use smartbed_reconcile::{AssignRequest, Backend, ConsoleError, HttpBackend, Role, SessionState};
use support::session;
use wiremock::matchers::{body_json, body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_queue_sends_bearer_and_decodes_wait_times() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/patients/queue"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "P-1A2B3C", "name": "Ada", "age": 71, "condition": "Sepsis",
                "triage_level": "Red", "acuity_score": 92, "wait_time": "1h 5m"
            },
            {
                "id": "P-4D5E6F", "name": "Bo", "age": 33, "condition": "Fracture",
                "triage_level": "Green", "acuity_score": 20, "wait_time": 14
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let queue = backend.patient_queue().await.unwrap();

    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].triage_level, TriageLevel::Red);
    assert_eq!(queue[0].wait_time.minutes(), 65);
    assert_eq!(queue[1].wait_time.minutes(), 14);
}

#[tokio::test]
async fn test_beds_with_embedded_patient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/beds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "B-ICU-01", "ward_id": "W-ICU", "ward_name": "ICU",
                "bed_type": "ICU", "status": "Occupied",
                "patient": {
                    "id": "P-000001", "name": "Cy", "age": 60, "condition": "MI",
                    "triage_level": "Red", "acuity_score": 88, "status": "Assigned",
                    "wait_time": 0
                }
            },
            {
                "id": "B-GEN-07", "ward_id": "W-GEN", "bed_type": "General",
                "status": "Maintenance", "patient": null
            }
        ])))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let beds = backend.beds().await.unwrap();

    assert!(beds.iter().all(|b| b.is_consistent()));
    assert_eq!(beds[1].status, BedStatus::OutOfService);
}

#[tokio::test]
async fn test_unauthorized_expires_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/wards"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = session();
    let backend = HttpBackend::new(&server.uri(), session.clone()).unwrap();

    let err = backend.wards().await.unwrap_err();
    assert_eq!(err, ConsoleError::Auth("Could not validate credentials".into()));
    assert_eq!(session.state(), SessionState::Expired);

    // No further traffic once expired.
    assert_eq!(backend.wards().await.unwrap_err(), ConsoleError::NoSession);
}

#[tokio::test]
async fn test_assign_conflict_carries_detail_and_idempotency_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/patients/P-1/assign"))
        .and(header_exists("idempotency-key"))
        .and(body_json(json!({"bed_id": "B-2", "priority_override": false})))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Bed is already occupied"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let request = AssignRequest::new("P-1".parse().unwrap(), "B-2".parse().unwrap(), false);

    let err = backend.assign(&request).await.unwrap_err();
    assert_eq!(err, ConsoleError::rejected(400, "Bed is already occupied"));
}

#[tokio::test]
async fn test_assign_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/patients/P-1/assign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success", "patient_id": "P-1", "bed_id": "B-2"
        })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let request = AssignRequest::new("P-1".parse().unwrap(), "B-2".parse().unwrap(), true);

    let receipt = backend.assign(&request).await.unwrap();
    assert_eq!(receipt.bed_id.unwrap().as_str(), "B-2");
}

#[tokio::test]
async fn test_optimize_preserves_assignment_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/allocation/optimize"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"status":"success","assignments":{"P-3":"B-9","P-1":"B-4"},"objective_value":57.0,"metrics":{"wait_time_reduction_mins":8,"survival_prob_increase":3.5}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let set = backend.optimize().await.unwrap();

    let order: Vec<&str> = set.entries().iter().map(|e| e.patient_id.as_str()).collect();
    assert_eq!(order, vec!["P-3", "P-1"]);
    assert_eq!(set.objective_value(), Some(57.0));
}

#[tokio::test]
async fn test_optimize_empty_queue_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/allocation/optimize"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "No patients in queue"})),
        )
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let err = backend.optimize().await.unwrap_err();
    assert_eq!(err, ConsoleError::rejected(400, "No patients in queue"));
}

#[tokio::test]
async fn test_validation_error_detail_is_flattened() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/patients"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [{"loc": ["body", "age"], "msg": "field required"}]
        })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let new_patient = NewPatient {
        name: "Dee".into(),
        age: 40,
        condition: "Asthma".into(),
        triage_level: TriageLevel::Yellow,
        acuity_score: AcuityScore::new(45).unwrap(),
    };

    match backend.create_patient(&new_patient).await.unwrap_err() {
        ConsoleError::Rejected { status, message } => {
            assert_eq!(status, 422);
            assert!(message.contains("field required"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_create_patient_validates_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/patients"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let new_patient = NewPatient {
        name: "  ".into(),
        age: 40,
        condition: "Asthma".into(),
        triage_level: TriageLevel::Yellow,
        acuity_score: AcuityScore::new(45).unwrap(),
    };

    assert!(matches!(
        backend.create_patient(&new_patient).await,
        Err(ConsoleError::Invalid(_))
    ));
}

#[tokio::test]
async fn test_login_posts_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_string_contains("username=nurse%40ward.test"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jwt", "token_type": "bearer", "role": "nurse", "name": "Nora"
        })))
        .mount(&server)
        .await;

    let login = HttpBackend::login(&server.uri(), "nurse@ward.test", "hunter2")
        .await
        .unwrap();
    assert_eq!(login.access_token, "jwt");
    assert_eq!(login.role, Role::Nurse);
}

#[tokio::test]
async fn test_login_bad_password() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect username or password"})),
        )
        .mount(&server)
        .await;

    let err = HttpBackend::login(&server.uri(), "x", "y").await.unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/kpis"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    assert!(matches!(
        backend.kpis().await,
        Err(ConsoleError::Decode { .. })
    ));
}

#[tokio::test]
async fn test_forecast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metrics": {"rmse": 2.1, "mae": 1.7, "model_type": "Prophet"},
            "data": [
                {"date": "2026-01-01", "actual": 40.0},
                {"date": "2026-01-02", "predicted": 44.2, "lower": 39.0, "upper": 49.5}
            ]
        })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let forecast = backend.forecast().await.unwrap();
    assert_eq!(forecast.data.len(), 2);
    assert_eq!(forecast.metrics.model_type.as_deref(), Some("Prophet"));
}

#[tokio::test]
async fn test_simulate_surge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/simulator/run"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({
            "acuity_modifier": 1.2,
            "inflow_modifier": 1.5,
            "staff_availability": 0.9
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "timeline": [
                {"hour": "0", "occupancy": 70, "capacity": 100},
                {"hour": "12", "occupancy": 115, "capacity": 100},
                {"hour": "16", "occupancy": 125, "capacity": 100},
                {"hour": "24", "occupancy": 95, "capacity": 100}
            ],
            "metrics": {"max_occupancy_pct": 125, "avg_wait_mins": 145, "patients_diverted": 42}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let result = backend.simulate(&Scenario::Surge.request()).await.unwrap();

    assert_eq!(result.timeline.len(), 4);
    assert_eq!(result.peak().unwrap().hour, 16);
    assert_eq!(result.metrics.patients_diverted, 42);
    assert_eq!(result.metrics.pressure(), Pressure::Exceeded);
}

#[tokio::test]
async fn test_simulate_out_of_range_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/simulator/run"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(&server.uri(), session()).unwrap();
    let request = SimRequest {
        staff_availability: 0.2,
        ..SimRequest::default()
    };
    assert!(matches!(
        backend.simulate(&request).await,
        Err(ConsoleError::Invalid(_))
    ));
}
