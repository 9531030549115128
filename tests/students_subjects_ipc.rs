mod test_support;

use serde_json::json;
use test_support::{create_student, request_err, request_ok, select_workspace, spawn_sidecar};

#[test]
fn matricules_count_per_level_and_year() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-students-matricule");

    let a = create_student(&mut stdin, &mut reader, "1", "Baldé", "CP1");
    let _b = create_student(&mut stdin, &mut reader, "2", "Camara", "CP1");
    let _c = create_student(&mut stdin, &mut reader, "3", "Diallo", "Tle");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "classLevel": "CP1" }),
    );
    let students = listed["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);
    assert_eq!(students[0]["lastName"], "Baldé");
    assert_eq!(students[0]["matricule"], "202401001");
    assert_eq!(students[1]["matricule"], "202401002");

    let all = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    let tle = all["students"]
        .as_array()
        .expect("students")
        .iter()
        .find(|s| s["classLevel"] == "Tle")
        .cloned()
        .expect("Tle student");
    assert_eq!(tle["matricule"], "202413001");

    let one = request_ok(&mut stdin, &mut reader, "6", "students.get", json!({ "studentId": a }));
    assert_eq!(one["student"]["active"], true);
    assert_eq!(one["student"]["sex"], "masculin");

    let code = request_err(&mut stdin, &mut reader, "7", "students.get", json!({ "studentId": "x" }));
    assert_eq!(code, "not_found");
}

#[test]
fn student_fields_are_validated() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-students-validation");

    let base = json!({
        "lastName": "Kaba",
        "firstNames": "Ibrahima",
        "birthDate": "2013-02-11",
        "sex": "masculin",
        "classLevel": "CM1",
    });
    let mut accepted = base.clone();
    accepted["parentPhone"] = json!("+224 622 12 34 56");
    let created = request_ok(&mut stdin, &mut reader, "ok", "students.create", accepted);
    assert_eq!(created["student"]["classLevel"], "CM1");

    let overrides = [
        ("lastName", json!("K")),
        ("firstNames", json!("")),
        ("birthDate", json!("11/02/2013")),
        ("sex", json!("autre")),
        ("classLevel", json!("CM3")),
        ("parentPhone", json!("0612345678")),
        ("schoolYear", json!("2024-2026")),
    ];
    for (i, (key, value)) in overrides.into_iter().enumerate() {
        let mut params = base.clone();
        params[key] = value;
        let code = request_err(&mut stdin, &mut reader, &format!("bad-{}", i), "students.create", params);
        assert_eq!(code, "bad_params", "field {}", key);
    }
}

#[test]
fn subjects_registry_rules() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-subjects");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "subjects.create",
        json!({ "name": "Français", "code": "fr", "coefficient": 3, "classLevels": ["6ème", "5ème"] }),
    );
    assert_eq!(created["subject"]["code"], "FR");
    assert_eq!(created["subject"]["color"], "#3B82F6");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "Éducation civique", "code": "EC" }),
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Français bis", "code": "FR" }),
    );
    assert_eq!(code, "duplicate");

    for (i, params) in [
        json!({ "name": "Arts", "code": "AR", "coefficient": 0 }),
        json!({ "name": "Arts", "code": "AR", "color": "blue" }),
        json!({ "name": "Arts", "code": "AR", "classLevels": ["CM9"] }),
        json!({ "name": "A", "code": "AR" }),
    ]
    .into_iter()
    .enumerate()
    {
        let code = request_err(&mut stdin, &mut reader, &format!("bad-{}", i), "subjects.create", params);
        assert_eq!(code, "bad_params", "case {}", i);
    }

    let sixieme = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.list",
        json!({ "classLevel": "6ème" }),
    );
    assert_eq!(sixieme["subjects"].as_array().map(|a| a.len()), Some(2));

    let terminale = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "subjects.list",
        json!({ "classLevel": "Tle" }),
    );
    let names: Vec<&str> = terminale["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Éducation civique"]);
}

#[test]
fn students_search_is_case_insensitive_and_paged() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = select_workspace(&mut stdin, &mut reader, "bulletind-students-search");

    for (i, name) in ["Émile", "Barry", "Bangoura", "Baldé", "Camara"].iter().enumerate() {
        let _ = create_student(&mut stdin, &mut reader, &format!("c{}", i), name, "CE1");
    }

    let found = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.list",
        json!({ "search": "éMI" }),
    );
    assert_eq!(found["total"].as_u64(), Some(1));
    assert_eq!(found["students"][0]["lastName"], "Émile");

    let by_matricule = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.list",
        json!({ "search": "202403004" }),
    );
    assert_eq!(by_matricule["total"].as_u64(), Some(1));
    assert_eq!(by_matricule["students"][0]["lastName"], "Baldé");

    let by_first_names = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.list",
        json!({ "search": "saliou" }),
    );
    assert_eq!(by_first_names["total"].as_u64(), Some(5));

    let page = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.list",
        json!({ "search": "ba", "page": 2, "limit": 2 }),
    );
    // Baldé, Bangoura, Barry match; page 2 holds the third.
    assert_eq!(page["total"].as_u64(), Some(3));
    assert_eq!(page["totalPages"].as_u64(), Some(2));
    let rows = page["students"].as_array().expect("students");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["lastName"], "Barry");

    let code = request_err(&mut stdin, &mut reader, "5", "students.list", json!({ "limit": 500 }));
    assert_eq!(code, "bad_params");
}
