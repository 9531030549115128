mod test_support;

use serde_json::json;
use test_support::{create_student, request_ok, select_workspace, spawn_sidecar};

#[test]
fn dashboard_counts_students_per_class_and_weekly_absences() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-dashboard");

    let a = create_student(&mut stdin, &mut reader, "1", "Camara", "6ème");
    let _ = create_student(&mut stdin, &mut reader, "2", "Diallo", "6ème");
    let _ = create_student(&mut stdin, &mut reader, "3", "Bah", "CP1");
    let _ = create_student(&mut stdin, &mut reader, "4", "Sow", "Tle");

    // Week of Monday 2024-11-04; one absence before it, two inside, one after.
    for (i, (date, present)) in [
        ("2024-11-01", false),
        ("2024-11-04", false),
        ("2024-11-06", true),
        ("2024-11-08", false),
        ("2024-11-11", false),
    ]
    .iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{}", i),
            "attendance.record",
            json!({ "studentId": a, "date": date, "subject": "Maths", "present": present }),
        );
    }

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "dashboard.stats",
        json!({ "today": "2024-11-06" }),
    );
    assert_eq!(stats.pointer("/students/total").and_then(|v| v.as_i64()), Some(4));
    let by_class = stats.pointer("/students/byClass").and_then(|v| v.as_array()).expect("byClass");
    let levels: Vec<(&str, i64)> = by_class
        .iter()
        .map(|c| (c["classLevel"].as_str().unwrap_or(""), c["count"].as_i64().unwrap_or(0)))
        .collect();
    assert_eq!(levels, vec![("CP1", 1), ("6ème", 2), ("Tle", 1)]);

    assert_eq!(stats.pointer("/attendance/weekStart"), Some(&json!("2024-11-04")));
    assert_eq!(stats.pointer("/attendance/weekEnd"), Some(&json!("2024-11-10")));
    assert_eq!(
        stats.pointer("/attendance/absencesThisWeek").and_then(|v| v.as_i64()),
        Some(2)
    );

    let other_year = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "dashboard.stats",
        json!({ "today": "2024-11-06", "schoolYear": "2030-2031" }),
    );
    assert_eq!(other_year.pointer("/students/total").and_then(|v| v.as_i64()), Some(0));
}
