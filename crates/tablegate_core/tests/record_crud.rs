use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tablegate_core::{
    open_db_in_memory, Direction, FieldError, FieldSpec, FieldType, ListOptions, Model,
    ModelConfig, ModelError, Phase, Record, SqliteConnection,
};

const SCHEMA: &str = "CREATE TABLE items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    value INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER
);";

fn rec(value: Value) -> Record {
    value.as_object().cloned().expect("fixture must be an object")
}

fn config() -> ModelConfig {
    ModelConfig::new("items")
        .field("id", FieldType::Number)
        .field("name", FieldType::String)
        .field("value", FieldType::Number)
        .field("timestamp", FieldType::Number)
        .required_fields(["name", "value"])
}

fn setup_with(config: ModelConfig) -> Model<SqliteConnection> {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    Model::create(config, conn).unwrap()
}

fn setup() -> Model<SqliteConnection> {
    setup_with(config())
}

fn seed(model: &Model<SqliteConnection>, count: i64) {
    for i in 0..count {
        model
            .add(rec(json!({"name": format!("item-{i}"), "value": i, "timestamp": 1000 + i})))
            .unwrap();
    }
}

#[test]
fn add_then_get_by_primary_roundtrip() {
    let model = setup();
    let input = rec(json!({"name": "first", "value": 7, "unknown": "dropped"}));

    let id = model.add(input.clone()).unwrap().expect("sqlite reports insert id");
    let loaded = model.by("id").unwrap().get(json!(id)).unwrap().unwrap();

    for (field, value) in model.filter_data(input) {
        assert_eq!(loaded.get(&field), Some(&value), "field {field}");
    }
    assert!(!loaded.contains_key("unknown"));
}

#[test]
fn add_missing_required_fields_reports_each_and_inserts_nothing() {
    let model = setup();

    let err = model.add(rec(json!({"timestamp": 1}))).unwrap_err();
    let missing: Vec<&str> = err.field_errors().iter().map(FieldError::field).collect();
    assert_eq!(missing, vec!["name", "value"]);
    assert!(err
        .field_errors()
        .iter()
        .all(|e| matches!(e, FieldError::MissingRequiredField { .. })));

    assert_eq!(model.count(Record::new()).unwrap(), 0);
}

#[test]
fn add_reports_every_invalid_field_before_required_check() {
    let model = setup();

    let err = model
        .add(rec(json!({"name": "", "value": "ten"})))
        .unwrap_err();
    assert!(err.is_invalid_field_value());
    assert!(!err.is_missing_required_field());
    assert_eq!(err.field_errors().len(), 2);
    assert_eq!(model.count(Record::new()).unwrap(), 0);
}

#[test]
fn invalid_query_blocks_every_operation() {
    let model = setup();
    seed(&model, 3);
    let bad = || rec(json!({"id": "not-a-number"}));

    assert!(model.get(bad()).unwrap_err().is_invalid_field_value());
    assert!(model
        .list(bad(), &ListOptions::default())
        .unwrap_err()
        .is_invalid_field_value());
    assert!(model.count(bad()).unwrap_err().is_invalid_field_value());
    assert!(model
        .update(bad(), rec(json!({"value": 1})))
        .unwrap_err()
        .is_invalid_field_value());
    assert!(model.incr(bad(), "value", 1).unwrap_err().is_invalid_field_value());
    assert!(model.delete(bad()).unwrap_err().is_invalid_field_value());

    assert_eq!(model.count(Record::new()).unwrap(), 3);
}

#[test]
fn count_all_and_by_key() {
    let model = setup();
    seed(&model, 10);

    assert_eq!(model.count(Record::new()).unwrap(), 10);
    assert_eq!(model.count(rec(json!({"id": 2}))).unwrap(), 1);
    assert_eq!(model.count(rec(json!({"name": "item-4"}))).unwrap(), 1);
    assert_eq!(model.count(rec(json!({"ghost": 1}))).unwrap(), 10);
}

#[test]
fn list_defaults_to_page_size_in_insertion_order() {
    let model = setup_with(config().limit(5));
    seed(&model, 8);

    let rows = model.list(Record::new(), &ListOptions::default()).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn list_with_offset_and_order_starts_from_eleventh_row() {
    let model = setup();
    seed(&model, 25);

    let options: ListOptions =
        serde_json::from_value(json!({"offset": 10, "order": [["id", "asc"]]})).unwrap();
    let rows = model.list(Record::new(), &options).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();

    assert_eq!(ids.len(), 15);
    assert_eq!(ids[0], 11);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn list_string_order_matches_pair_order() {
    let model = setup();
    seed(&model, 6);

    let by_text = model
        .list(Record::new(), &ListOptions::new().order_str("id:desc"))
        .unwrap();
    let by_pairs = model
        .list(
            Record::new(),
            &ListOptions::new().order_by("id", Direction::Desc),
        )
        .unwrap();

    assert_eq!(by_text, by_pairs);
    assert_eq!(by_text[0]["id"], json!(6));
}

#[test]
fn list_zero_limit_uses_default_page_size() {
    let model = setup_with(config().limit(4));
    seed(&model, 9);

    let rows = model
        .list(Record::new(), &ListOptions::new().limit(0))
        .unwrap();
    assert_eq!(rows.len(), 4);
}

#[test]
fn list_filters_by_query_and_respects_limit() {
    let model = setup();
    seed(&model, 5);
    model
        .add(rec(json!({"name": "item-2", "value": 99})))
        .unwrap();

    let rows = model
        .list(
            rec(json!({"name": "item-2"})),
            &ListOptions::new().order_by("value", Direction::Desc).limit(1),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["value"], json!(99));
}

#[test]
fn update_returns_affected_rows_and_ignores_unknown_fields() {
    let model = setup();
    seed(&model, 4);

    let changed = model
        .update(
            rec(json!({"name": "item-1"})),
            rec(json!({"value": 50, "bogus": true})),
        )
        .unwrap();
    assert_eq!(changed, 1);

    let row = model.get(rec(json!({"name": "item-1"}))).unwrap().unwrap();
    assert_eq!(row["value"], json!(50));

    let err = model
        .update(rec(json!({"id": 1})), rec(json!({"value": "lots"})))
        .unwrap_err();
    assert!(err.is_invalid_field_value());
}

#[test]
fn incr_adds_amount_to_field() {
    let model = setup();
    let id = model
        .add(rec(json!({"name": "counter", "value": 10})))
        .unwrap()
        .unwrap();
    let query = rec(json!({"id": id}));

    assert_eq!(model.incr(query.clone(), "value", 5).unwrap(), 1);
    let row = model.get(query).unwrap().unwrap();
    assert_eq!(row["value"], json!(15));
}

#[test]
fn delete_returns_affected_rows() {
    let model = setup();
    seed(&model, 3);

    assert_eq!(model.delete(rec(json!({"id": 2}))).unwrap(), 1);
    assert_eq!(model.delete(rec(json!({"id": 2}))).unwrap(), 0);
    assert!(model.get(rec(json!({"id": 2}))).unwrap().is_none());
    assert_eq!(model.count(Record::new()).unwrap(), 2);
}

#[test]
fn get_missing_row_returns_none() {
    let model = setup();
    assert!(model.get(rec(json!({"id": 404}))).unwrap().is_none());
}

#[test]
fn formatters_run_with_phase_tags_in_order() {
    let phases: Arc<Mutex<Vec<Phase>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&phases);
    let model = setup_with(
        config()
            .input(move |mut record, phase| {
                seen.lock().unwrap().push(phase);
                if phase == Phase::Add {
                    record.insert("timestamp".to_string(), json!(42));
                }
                Ok(record)
            })
            .output(|mut record| {
                record.insert("formatted".to_string(), json!(true));
                Ok(record)
            }),
    );

    let id = model
        .add(rec(json!({"name": "fmt", "value": 1})))
        .unwrap()
        .unwrap();
    let row = model.get(rec(json!({"id": id}))).unwrap().unwrap();
    assert_eq!(row["timestamp"], json!(42));
    assert_eq!(row["formatted"], json!(true));

    model
        .update(rec(json!({"id": id})), rec(json!({"value": 2})))
        .unwrap();
    model.incr(rec(json!({"id": id})), "value", 1).unwrap();
    let rows = model.list(Record::new(), &ListOptions::default()).unwrap();
    assert!(rows.iter().all(|r| r["formatted"] == json!(true)));
    model.count(Record::new()).unwrap();
    model.delete(rec(json!({"id": id}))).unwrap();

    assert_eq!(
        *phases.lock().unwrap(),
        vec![
            Phase::Add,
            Phase::Get,
            Phase::UpdateQuery,
            Phase::UpdateData,
            Phase::UpdateQuery,
            Phase::List,
            Phase::Count,
            Phase::Delete,
        ]
    );
}

#[test]
fn formatter_failure_stops_the_pipeline() {
    let model = setup_with(config().input(|_, _| Err("input rejected".into())));

    let err = model
        .add(rec(json!({"name": "x", "value": 1})))
        .unwrap_err();
    match err {
        ModelError::Format { phase, source } => {
            assert_eq!(phase, "add");
            assert_eq!(source.to_string(), "input rejected");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn pattern_and_predicate_fields_validate_queries() {
    let model = setup_with(
        ModelConfig::new("items")
            .field("id", FieldType::Number)
            .field("name", regex::Regex::new("^item-[0-9]+$").unwrap())
            .field(
                "value",
                FieldSpec::predicate(|v| v.as_i64().is_some_and(|n| n >= 0)),
            ),
    );

    model.add(rec(json!({"name": "item-1", "value": 3}))).unwrap();
    let err = model
        .add(rec(json!({"name": "other", "value": -1})))
        .unwrap_err();
    let fields: Vec<&str> = err.field_errors().iter().map(FieldError::field).collect();
    assert_eq!(fields, vec!["name", "value"]);
}

#[test]
fn connection_errors_are_passed_through() {
    let conn = open_db_in_memory().unwrap();
    let model = Model::create(config(), conn).unwrap();

    let err = model.count(Record::new()).unwrap_err();
    match err {
        ModelError::Connection(inner) => {
            assert!(inner.downcast_ref::<tablegate_core::DbError>().is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}
