use bindery_core::{Workbook, WorkbookValidationError, SOURCE_CODE_MAX_BYTES};

#[test]
fn new_workbook_starts_unshared_and_valid() {
    let workbook = Workbook::new("u1", "wb1", "monthly report", "totals per region", "print(1)");

    assert_eq!(workbook.owner_id, "u1");
    assert_eq!(workbook.workbook_id, "wb1");
    assert_eq!(workbook.name, "monthly report");
    assert_eq!(workbook.description, "totals per region");
    assert_eq!(workbook.source_code, "print(1)");
    assert!(workbook.shared_with.is_empty());
    workbook.validate().unwrap();
}

#[test]
fn source_code_bound_is_inclusive_at_limit() {
    let at_limit = Workbook::new("u1", "wb1", "n", "d", "a".repeat(SOURCE_CODE_MAX_BYTES));
    at_limit.validate().unwrap();

    let over_limit = Workbook::new("u1", "wb1", "n", "d", "a".repeat(SOURCE_CODE_MAX_BYTES + 1));
    let err = over_limit.validate().unwrap_err();
    assert_eq!(
        err,
        WorkbookValidationError::SourceCodeTooLarge {
            actual_bytes: SOURCE_CODE_MAX_BYTES + 1,
            max_bytes: SOURCE_CODE_MAX_BYTES,
        }
    );
}

#[test]
fn validate_rejects_owner_in_shared_with() {
    let mut workbook = Workbook::new("u1", "wb1", "n", "d", "");
    workbook.shared_with.insert("u1".to_string());

    let err = workbook.validate().unwrap_err();
    assert_eq!(err, WorkbookValidationError::SharedWithContainsOwner);
}

#[test]
fn shared_with_membership_is_duplicate_free() {
    let mut workbook = Workbook::new("u1", "wb1", "n", "d", "");
    workbook.shared_with.insert("u2".to_string());
    workbook.shared_with.insert("u2".to_string());

    assert_eq!(workbook.shared_with.len(), 1);
    assert!(workbook.is_shared_with("u2"));
    assert!(!workbook.is_shared_with("u3"));
}

#[test]
fn workbook_serialization_uses_expected_wire_fields() {
    let mut workbook = Workbook::new("u1", "wb1", "report", "desc", "x = 1");
    workbook.shared_with.insert("u2".to_string());
    workbook.shared_with.insert("u3".to_string());

    let json = serde_json::to_value(&workbook).unwrap();
    assert_eq!(json["owner_id"], "u1");
    assert_eq!(json["workbook_id"], "wb1");
    assert_eq!(json["name"], "report");
    assert_eq!(json["description"], "desc");
    assert_eq!(json["source_code"], "x = 1");
    assert_eq!(json["shared_with"], serde_json::json!(["u2", "u3"]));

    let decoded: Workbook = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, workbook);
}

#[test]
fn deserialization_defaults_missing_shared_with_to_empty() {
    let decoded: Workbook = serde_json::from_value(serde_json::json!({
        "owner_id": "u1",
        "workbook_id": "wb1",
        "name": "n",
        "description": "d",
        "source_code": ""
    }))
    .unwrap();

    assert!(decoded.shared_with.is_empty());
}
