//! Property tests for in-memory index replace semantics.

use proptest::prelude::*;
use vecfeed_index::inmemory::InMemoryIndex;
use vecfeed_index::index::VectorIndex;
use vecfeed_index::record::EmbeddingRecord;

/// Generate a record with a small identifier space so replacements are common.
fn arb_record(dim: usize) -> impl Strategy<Value = EmbeddingRecord> {
    ("C-10[0-9]", "[a-z ]{5,30}", proptest::collection::vec(-1.0f32..1.0f32, dim))
        .prop_map(|(id, text, embedding)| EmbeddingRecord { id, text, embedding })
}

/// **Property: replace semantics.**
/// *For any* sequence of records written via delete-then-insert, the index
/// holds at most one record per identifier, and the record held for each
/// identifier is the last one written for it.
mod prop_replace_semantics {
    use super::*;

    use std::collections::HashMap;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn last_write_wins_per_identifier(
            records in proptest::collection::vec(arb_record(DIM), 1..40),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let index = InMemoryIndex::new();
                index.ensure_collection("test", DIM).await.unwrap();

                let mut expected: HashMap<String, EmbeddingRecord> = HashMap::new();
                for record in &records {
                    index.delete("test", &[record.id.as_str()]).await.unwrap();
                    index.insert("test", std::slice::from_ref(record)).await.unwrap();
                    expected.insert(record.id.clone(), record.clone());
                }

                assert_eq!(index.len("test").await, expected.len());
                for (id, record) in &expected {
                    assert_eq!(index.fetch("test", id).await.as_ref(), Some(record));
                }
            });
        }
    }
}

/// Inserting an identifier that was not deleted first is an error, not a
/// silent overwrite.
#[tokio::test]
async fn duplicate_insert_is_rejected() {
    let index = InMemoryIndex::new();
    index.ensure_collection("test", 4).await.unwrap();

    let record = EmbeddingRecord::new("C-100", "Ann Lee Auto Insurance", vec![0.1, 0.2, 0.3, 0.4]);
    index.insert("test", std::slice::from_ref(&record)).await.unwrap();

    let err = index.insert("test", &[record]).await.unwrap_err();
    assert!(err.to_string().contains("duplicate"), "unexpected error: {err}");
}

#[tokio::test]
async fn delete_ignores_unknown_identifiers() {
    let index = InMemoryIndex::new();
    index.ensure_collection("test", 4).await.unwrap();

    index.delete("test", &["never-inserted"]).await.unwrap();
    assert!(index.is_empty("test").await);
}

#[tokio::test]
async fn drop_collection_removes_all_records() {
    let index = InMemoryIndex::new();
    index.ensure_collection("test", 4).await.unwrap();
    index
        .insert("test", &[EmbeddingRecord::new("C-100", "text", vec![0.0; 4])])
        .await
        .unwrap();

    index.drop_collection("test").await.unwrap();

    assert_eq!(index.len("test").await, 0);
    let err = index
        .insert("test", &[EmbeddingRecord::new("C-101", "text", vec![0.0; 4])])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not exist"), "unexpected error: {err}");
}
