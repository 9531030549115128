mod test_support;

use serde_json::json;
use test_support::{
    add_evaluation, create_student, request_err, request_ok, select_workspace, spawn_sidecar,
};

#[test]
fn report_card_weights_subjects_and_classifies_overall() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-report-card");
    let student_id = create_student(&mut stdin, &mut reader, "1", "Camara", "6ème");

    add_evaluation(&mut stdin, &mut reader, "2", &student_id, "Mathématiques", 12.0, 2.0, "T1");
    add_evaluation(&mut stdin, &mut reader, "3", &student_id, "Mathématiques", 16.0, 1.0, "T1");
    add_evaluation(&mut stdin, &mut reader, "4", &student_id, "Français", 15.0, 1.0, "T1");
    // Other term, must not leak into T1.
    add_evaluation(&mut stdin, &mut reader, "5", &student_id, "Français", 2.0, 1.0, "T2");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.reportCard",
        json!({ "studentId": student_id, "term": "T1", "schoolYear": "2024-2025" }),
    );
    let card = &result["reportCard"];
    let subjects = card["subjectAverages"].as_array().expect("subjectAverages");
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0]["subject"], "Mathématiques");
    assert_eq!(subjects[0]["average"].as_f64(), Some(13.33));
    assert_eq!(subjects[0]["evaluationCount"].as_u64(), Some(2));
    assert_eq!(subjects[1]["subject"], "Français");
    assert_eq!(subjects[1]["average"].as_f64(), Some(15.0));

    assert_eq!(card["overallAverage"].as_f64(), Some(13.75));
    assert_eq!(card["appreciation"], "Bien");
    assert_eq!(card["appreciationColor"], "orange");
    assert_eq!(card["term"], "T1");
    assert_eq!(card["student"]["matricule"], "202407001");
    assert!(card.get("generatedAt").and_then(|v| v.as_str()).is_some());
}

#[test]
fn report_card_without_grades_has_no_average() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-report-empty");
    let student_id = create_student(&mut stdin, &mut reader, "1", "Diallo", "CM2");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.reportCard",
        json!({ "studentId": student_id, "term": "T2" }),
    );
    let card = &result["reportCard"];
    assert_eq!(card["subjectAverages"].as_array().map(|a| a.len()), Some(0));
    assert!(card["overallAverage"].is_null());
    assert!(card["appreciation"].is_null());
    assert_eq!(card["attendance"]["totalSessions"].as_u64(), Some(0));
    assert!(card["attendance"]["attendanceRate"].is_null());
    assert_eq!(card["schoolYear"], "2024-2025");
}

#[test]
fn zero_coefficient_subject_is_listed_as_excluded() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-report-zero-weight");
    let student_id = create_student(&mut stdin, &mut reader, "1", "Bah", "3ème");

    add_evaluation(&mut stdin, &mut reader, "2", &student_id, "Dessin", 18.0, 0.0, "T1");
    add_evaluation(&mut stdin, &mut reader, "3", &student_id, "Histoire", 16.0, 1.0, "T1");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.reportCard",
        json!({ "studentId": student_id, "term": "T1" }),
    );
    let card = &result["reportCard"];
    assert_eq!(card["excludedSubjects"], json!(["Dessin"]));
    assert_eq!(card["subjectAverages"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(card["overallAverage"].as_f64(), Some(16.0));
    assert_eq!(card["appreciation"], "Excellent");
}

#[test]
fn report_settings_change_order_and_timestamp() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-report-settings");
    let student_id = create_student(&mut stdin, &mut reader, "1", "Sylla", "Tle");

    add_evaluation(&mut stdin, &mut reader, "2", &student_id, "Physique", 11.0, 1.0, "T3");
    add_evaluation(&mut stdin, &mut reader, "3", &student_id, "Anglais", 9.0, 1.0, "T3");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({
            "section": "reports",
            "patch": { "subjectOrder": "alphabetical", "showGeneratedAt": false }
        }),
    );
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.reportCard",
        json!({ "studentId": student_id, "term": "T3" }),
    );
    let card = &result["reportCard"];
    assert_eq!(card["subjectAverages"][0]["subject"], "Anglais");
    assert_eq!(card["subjectAverages"][1]["subject"], "Physique");
    assert_eq!(card["overallAverage"].as_f64(), Some(10.0));
    assert_eq!(card["appreciation"], "Satisfaisant");
    assert!(card.get("generatedAt").is_none());
}

#[test]
fn registry_metadata_decorates_subject_rows() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-report-registry");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "subjects.create",
        json!({ "name": "Mathématiques", "code": "math", "coefficient": 4, "color": "#10B981" }),
    );
    let student_id = create_student(&mut stdin, &mut reader, "2", "Keita", "2nde");
    add_evaluation(&mut stdin, &mut reader, "3", &student_id, "Mathématiques", 14.0, 1.0, "T1");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.reportCard",
        json!({ "studentId": student_id, "term": "T1" }),
    );
    let row = &result["reportCard"]["subjectAverages"][0];
    assert_eq!(row["code"], "MATH");
    assert_eq!(row["color"], "#10B981");
}

#[test]
fn report_card_errors() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-report-errors");
    let student_id = create_student(&mut stdin, &mut reader, "1", "Condé", "4ème");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "reports.reportCard",
        json!({ "studentId": "missing", "term": "T1" }),
    );
    assert_eq!(code, "not_found");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "reports.reportCard",
        json!({ "studentId": student_id, "term": "T4" }),
    );
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "reports.reportCard",
        json!({ "studentId": student_id }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn class_summary_lists_active_students_by_name() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-class-summary");
    let soumah = create_student(&mut stdin, &mut reader, "1", "Soumah", "5ème");
    let bangoura = create_student(&mut stdin, &mut reader, "2", "Bangoura", "5ème");
    let _other = create_student(&mut stdin, &mut reader, "3", "Touré", "4ème");

    add_evaluation(&mut stdin, &mut reader, "4", &soumah, "SVT", 8.0, 1.0, "T1");
    add_evaluation(&mut stdin, &mut reader, "5", &bangoura, "SVT", 17.5, 1.0, "T1");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.classSummary",
        json!({ "classLevel": "5ème", "term": "T1" }),
    );
    let rows = result["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["studentId"].as_str(), Some(bangoura.as_str()));
    assert_eq!(rows[0]["overallAverage"].as_f64(), Some(17.5));
    assert_eq!(rows[0]["appreciation"], "Excellent");
    assert_eq!(rows[1]["studentId"].as_str(), Some(soumah.as_str()));
    assert_eq!(rows[1]["appreciation"], "À améliorer");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "reports.classSummary",
        json!({ "classLevel": "7ème", "term": "T1" }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn appreciation_bands_are_published_highest_first() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let result = request_ok(&mut stdin, &mut reader, "1", "reports.appreciationBands", json!({}));
    let bands = result["bands"].as_array().expect("bands");
    assert_eq!(bands.len(), 5);
    assert_eq!(bands[0]["label"], "Excellent");
    assert_eq!(bands[0]["lowerBound"].as_f64(), Some(16.0));
    assert_eq!(bands[4]["label"], "À améliorer");
    assert_eq!(bands[4]["color"], "red");
}
