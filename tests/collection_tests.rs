use docshelf::{
    CollectionState, Database, DbError, FieldOptions, FieldType, FindOptions, IndexOptions,
    SortOrder,
};
use serde_json::{Value as JsonValue, json};

fn as_json(documents: Vec<docshelf::Document>) -> Vec<JsonValue> {
    documents.into_iter().map(JsonValue::Object).collect()
}

#[tokio::test]
async fn test_insert_infers_field_types() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    users
        .insert_one(json!({"name": "John", "age": 25, "uid": 3455.328}))
        .await?;

    let fields = users.get_fields().await?;
    let types: Vec<(&str, &FieldType)> = fields
        .iter()
        .map(|f| (f.name.as_str(), &f.field_type))
        .collect();

    assert_eq!(
        types,
        vec![
            ("_id", &FieldType::Text),
            ("name", &FieldType::Text),
            ("age", &FieldType::Integer),
            ("uid", &FieldType::Real),
        ]
    );
    assert!(fields[0].is_primary);

    Ok(())
}

#[tokio::test]
async fn test_insert_and_find_round_trip() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    let id = users
        .insert_one(json!({"name": "John", "age": 25, "uid": 3455.328}))
        .await?;

    let found = as_json(users.find(&json!({}), FindOptions::default()).await?);
    assert_eq!(
        found,
        vec![json!({"_id": id, "name": "John", "age": 25, "uid": 3455.328})]
    );

    Ok(())
}

#[tokio::test]
async fn test_fields_cover_every_inserted_key() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let events = db.get_collection("events").await?;

    events.insert_one(json!({"kind": "click"})).await?;
    events
        .insert_one(json!({"kind": "view", "page": "/", "duration": 1.5, "tags": ["a", "b"]}))
        .await?;

    let names: Vec<String> = events.get_fields().await?.into_iter().map(|f| f.name).collect();
    for key in ["_id", "kind", "page", "duration", "tags"] {
        assert!(names.iter().any(|n| n == key), "missing field {}", key);
        assert!(events.field_exists(key).await?);
    }
    assert!(!events.field_exists("missing").await?);

    Ok(())
}

#[tokio::test]
async fn test_values_are_stored_by_kind() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let items = db.get_collection("items").await?;

    items
        .insert_one(json!({"_id": "i1", "active": true, "meta": {"a": 1}, "note": null}))
        .await?;

    let item = items.find_one(&json!({"_id": "i1"})).await?.expect("item");
    assert_eq!(item["active"], json!(1));
    assert_eq!(item["meta"], json!("{\"a\":1}"));
    assert_eq!(item["note"], JsonValue::Null);

    let note = items
        .get_fields()
        .await?
        .into_iter()
        .find(|f| f.name == "note")
        .expect("note field");
    assert_eq!(note.field_type, FieldType::Text);

    Ok(())
}

#[tokio::test]
async fn test_type_conflict_rolls_back_the_write() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    users.insert_one(json!({"age": 25})).await?;

    let err = users
        .insert_one(json!({"age": "old", "nickname": "J"}))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::SchemaConflict(_)));

    assert_eq!(users.count_documents(&json!({})).await?, 1);
    assert!(!users.field_exists("nickname").await?);

    // Integers fit REAL columns, not the other way round.
    users.insert_one(json!({"score": 1.5})).await?;
    users.insert_one(json!({"score": 2})).await?;
    let err = users.insert_one(json!({"age": 2.5})).await.unwrap_err();
    assert!(matches!(err, DbError::SchemaConflict(_)));

    Ok(())
}

#[tokio::test]
async fn test_keys_differing_only_in_case_conflict() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    users.insert_one(json!({"Name": "a"})).await?;
    let err = users.insert_one(json!({"name": "b"})).await.unwrap_err();
    assert!(matches!(err, DbError::SchemaConflict(_)));

    let err = users.insert_one(json!({"a": 1, "A": 2})).await.unwrap_err();
    assert!(matches!(err, DbError::SchemaConflict(_)));

    assert_eq!(users.count_documents(&json!({})).await?, 1);
    assert!(users.field_exists("name").await?);
    assert!(!users.field_exists("a").await?);

    // `$unset` finds the column whatever the spelling.
    users
        .update_one(&json!({}), &json!({"$unset": {"NAME": ""}}))
        .await?;
    let doc = users.find_one(&json!({})).await?.expect("document");
    assert_eq!(doc["Name"], JsonValue::Null);

    Ok(())
}

#[tokio::test]
async fn test_integral_floats_are_integers() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let stats = db.get_collection("stats").await?;

    stats.insert_one(json!({"n": 25.0, "ratio": 0.5})).await?;
    let fields = stats.get_fields().await?;
    assert_eq!(fields[1].field_type, FieldType::Integer);
    assert_eq!(fields[2].field_type, FieldType::Real);

    stats.insert_one(json!({"n": 7})).await?;
    let doc = stats
        .find_one(&json!({"n": 25}))
        .await?
        .expect("document");
    assert_eq!(doc["n"], json!(25));

    Ok(())
}

#[tokio::test]
async fn test_insert_many() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let scores = db.get_collection("scores").await?;

    let ids = scores
        .insert_many(vec![
            json!({"_id": "a", "score": 1}),
            json!({"_id": "b", "score": 2.5}),
            json!({"player": "c"}),
        ])
        .await?;
    assert_eq!(ids.len(), 3);
    assert_eq!(&ids[..2], &["a".to_string(), "b".to_string()]);

    let score = scores
        .get_fields()
        .await?
        .into_iter()
        .find(|f| f.name == "score")
        .expect("score field");
    assert_eq!(score.field_type, FieldType::Real);

    let err = scores
        .insert_many(vec![json!({"level": 1}), json!({"level": "one"})])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::SchemaConflict(_)));
    assert!(!scores.field_exists("level").await?);

    assert!(matches!(
        scores.insert_many(Vec::new()).await,
        Err(DbError::EmptyDocument)
    ));

    Ok(())
}

#[tokio::test]
async fn test_insert_rejections() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    assert!(matches!(
        users.insert_one(json!({"_id": 7})).await,
        Err(DbError::InvalidDocument(_))
    ));
    assert!(matches!(
        users.insert_one(json!("not a document")).await,
        Err(DbError::InvalidDocument(_))
    ));
    assert!(matches!(
        users.insert_one(json!({"bad key": 1})).await,
        Err(DbError::InvalidIdentifier(_))
    ));

    users.insert_one(json!({"_id": "u1"})).await?;
    assert!(matches!(
        users.insert_one(json!({"_id": "u1"})).await,
        Err(DbError::Engine(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_generated_ids_are_unique() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    let first = users.insert_one(json!({"name": "a"})).await?;
    let second = users.insert_one(json!({"name": "b"})).await?;

    assert_ne!(first, second);
    assert!(first.ends_with("_d"));

    Ok(())
}

#[tokio::test]
async fn test_create_field() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    let email = users
        .create_field("email", FieldOptions::new().unique())
        .await?;
    assert!(email.is_unique && email.is_index);

    users
        .create_field(
            "level",
            FieldOptions::new()
                .field_type(FieldType::Integer)
                .required()
                .default_value(1),
        )
        .await?;

    let fields = users.get_fields().await?;
    let email = fields.iter().find(|f| f.name == "email").expect("email");
    assert!(email.is_unique && email.is_optional);
    let level = fields.iter().find(|f| f.name == "level").expect("level");
    assert!(!level.is_optional);
    assert_eq!(level.default, Some(docshelf::Value::Integer(1)));

    let indexes = users.show_indexes().await?;
    assert!(indexes.iter().any(|i| i.name == "idx_users_email" && i.unique));

    users.insert_one(json!({"email": "a@x.io"})).await?;
    assert!(matches!(
        users.insert_one(json!({"email": "a@x.io"})).await,
        Err(DbError::Engine(_))
    ));

    let stored = users.find_one(&json!({"email": "a@x.io"})).await?.expect("user");
    assert_eq!(stored["level"], json!(1));

    Ok(())
}

#[tokio::test]
async fn test_create_field_conflicts() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    users.create_field("name", FieldOptions::new()).await?;

    for (name, options) in [
        ("name", FieldOptions::new()),
        ("_id", FieldOptions::new()),
        ("pk", FieldOptions::new().primary()),
        ("required", FieldOptions::new().required()),
        (
            "count",
            FieldOptions::new()
                .field_type(FieldType::Integer)
                .default_value("zero"),
        ),
    ] {
        let err = users.create_field(name, options).await.unwrap_err();
        assert!(matches!(err, DbError::SchemaConflict(_)), "{}: {:?}", name, err);
    }

    Ok(())
}

#[tokio::test]
async fn test_indexes() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;
    users.insert_one(json!({"name": "Ann", "age": 30})).await?;

    let name = users
        .ensure_index(&["name", "age"], IndexOptions::new().unique(true))
        .await?;
    assert_eq!(name, "idx_users_name_age");

    // Idempotent
    users
        .ensure_index(&["name", "age"], IndexOptions::new().unique(true))
        .await?;

    let indexes = users.show_indexes().await?;
    let index = indexes.iter().find(|i| i.name == name).expect("index");
    assert!(index.unique);
    assert_eq!(index.columns, vec!["name".to_string(), "age".to_string()]);

    // An index belongs to its own collection.
    let orders = db.get_collection("orders").await?;
    orders.drop_index(&name).await?;
    assert!(users.show_indexes().await?.iter().any(|i| i.name == name));

    users.drop_index(&name).await?;
    assert!(users.show_indexes().await?.iter().all(|i| i.name != name));

    assert!(matches!(
        users.ensure_index(&[], IndexOptions::new()).await,
        Err(DbError::InvalidOption(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_readiness_and_field_cache() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let users = db.get_collection("users").await?;

    assert_eq!(users.state(), CollectionState::Ready);
    assert!(users.cached_fields().is_none());

    users.get_fields().await?;
    assert!(users.cached_fields().is_some());

    users.insert_one(json!({"name": "Ann"})).await?;
    assert!(users.cached_fields().is_none());

    users.insert_one(json!({"name": "Bob"})).await?;
    assert_eq!(
        users.cached_fields().map(|fields| fields.len()),
        Some(2)
    );

    Ok(())
}

#[tokio::test]
async fn test_concurrent_first_use() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;

    let mut handles = Vec::new();
    for i in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let logs = db.get_collection("logs").await?;
            logs.insert_one(json!({"n": i})).await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    let logs = db.get_collection("logs").await?;
    assert_eq!(logs.count_documents(&json!({})).await?, 8);

    Ok(())
}

#[tokio::test]
async fn test_sort_and_pagination() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let people = db.get_collection("people").await?;

    people
        .insert_many(vec![
            json!({"_id": "p3", "age": 20}),
            json!({"_id": "p1", "age": 40}),
            json!({"_id": "p2", "age": 30}),
        ])
        .await?;

    let by_id: Vec<JsonValue> = people
        .find(&json!({}), FindOptions::default())
        .await?
        .into_iter()
        .map(|d| d["_id"].clone())
        .collect();
    assert_eq!(by_id, vec![json!("p1"), json!("p2"), json!("p3")]);

    let by_age: Vec<JsonValue> = people
        .find(&json!({}), FindOptions::new().sort("age", SortOrder::Desc))
        .await?
        .into_iter()
        .map(|d| d["age"].clone())
        .collect();
    assert_eq!(by_age, vec![json!(40), json!(30), json!(20)]);

    let page = people
        .find(&json!({}), FindOptions::new().skip(1).limit(1))
        .await?;
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["_id"], json!("p2"));

    let none = people.find(&json!({}), FindOptions::new().limit(0)).await?;
    assert!(none.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_find_default_limit() -> anyhow::Result<()> {
    let db = Database::open_in_memory().await?;
    let numbers = db.get_collection("numbers").await?;

    let documents = (0..150)
        .rev()
        .map(|i| json!({"_id": format!("n{:03}", i), "value": i}))
        .collect();
    numbers.insert_many(documents).await?;

    let found = numbers.find(&json!({}), FindOptions::default()).await?;
    assert_eq!(found.len(), 100);
    assert_eq!(found[0]["_id"], json!("n000"));
    assert_eq!(found[99]["_id"], json!("n099"));

    let rest = numbers
        .find(&json!({}), FindOptions::new().skip(100))
        .await?;
    assert_eq!(rest.len(), 50);

    assert_eq!(numbers.count_documents(&json!({})).await?, 150);

    Ok(())
}
